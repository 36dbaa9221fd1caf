//! Orchestrates one ranking run: parse → score each layer → synergy → total → select → report.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::config::{Config, ConfigDocument};
use crate::data_handling::domtbl::DomainTable;
use crate::data_handling::go_annotations::{base_genes, GoAnnotationTable};
use crate::data_handling::orthology::OrthologyTable;
use crate::data_handling::plant_ontology::OntologyAnnotationTable;
use crate::data_handling::reference_annotation::ReferenceGff3;
use crate::data_handling::Dataset;
use crate::external_tools::hmmscan::HmmscanScanner;
use crate::external_tools::{DomainSearch, PrecomputedDomainTable};
use crate::id_mapping::IdMapper;
use crate::models::{
    DomainHit, EvidenceLayer, EvidenceTable, GeneId, GoAnnotation, OntologyContext,
    OrthologyRecord, ReferenceAnnotation,
};
use crate::output::qc::write_qc;
use crate::output::reports::ReportWriter;
use crate::output::run_manager::{
    config_hash, create_run_dir, run_id, update_latest, write_config_snapshot, write_manifest,
    ManifestEntry, RunDirectory,
};
use crate::scoring::{self, aggregate_totals, init_table, log_layer_summary};
use crate::selection::{select_high_confidence, Selection};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub results_dir: PathBuf,
    pub run_name: Option<String>,
    pub overwrite: bool,
    pub qc: bool,
}

#[derive(Debug)]
pub struct RankingOutcome {
    pub genes: Vec<GeneId>,
    pub table: EvidenceTable,
    /// `(gene, total)` sorted by total descending, ties by gene id.
    pub ranked: Vec<(GeneId, f64)>,
    pub selection: Selection,
}

/// Turns an optional layer's failure into "no evidence" with a warning.
fn optional_layer<T>(layer: EvidenceLayer, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} evidence unavailable, layer scores 0: {:#}", layer, e);
            None
        }
    }
}

fn step(n: usize, title: &str) {
    info!("STEP {}: {}", n, title);
}

fn load_go(config: &Config, mapper: &IdMapper) -> Result<Vec<GoAnnotation>> {
    let targets = config.target_go_terms();
    info!("Target GO terms: {}", targets.len());
    GoAnnotationTable {
        path: config.input_go_file.clone(),
        mapper,
        targets: &targets,
        level: config.level_filter(),
    }
    .load()
}

fn domain_hits(
    config: &Config,
    mapper: &IdMapper,
    genes: &[GeneId],
    work_dir: &Path,
) -> Result<Vec<DomainHit>> {
    let db = &config.domain_database;
    let search: Box<dyn DomainSearch + '_> = match &db.precomputed_domtbl {
        Some(path) => Box::new(PrecomputedDomainTable { path: path.clone() }),
        None => {
            let database = db
                .pfam_database
                .as_deref()
                .context("domain_database.pfam_database is not set")?;
            let fasta = db
                .protein_fasta
                .as_deref()
                .context("domain_database.protein_fasta is not set")?;
            Box::new(HmmscanScanner::new(
                &db.hmmscan_binary,
                database,
                fasta,
                mapper,
                db.cpu,
                db.evalue_threshold,
            )?)
        }
    };
    let wanted: BTreeSet<GeneId> = genes.iter().cloned().collect();
    let path = search.domain_table(&wanted, work_dir)?;
    DomainTable {
        path,
        mapper,
        evalue_threshold: db.evalue_threshold,
    }
    .load()
}

fn orthology_records(
    config: &Config,
    mapper: &IdMapper,
) -> Result<BTreeMap<GeneId, OrthologyRecord>> {
    let ortho = &config.evidence.orthology;
    let path = ortho
        .orthology_file
        .clone()
        .context("evidence.orthology.orthology_file is not set")?;
    let query = config.query_regex()?;
    let orthologue = config.orthologue_regex()?;
    OrthologyTable {
        path,
        mapper,
        query_regex: query.as_ref(),
        orthologue_regex: &orthologue,
        thresholds: &ortho.classification,
    }
    .load()
}

fn reference_annotations(config: &Config) -> Result<BTreeMap<String, ReferenceAnnotation>> {
    let path = config
        .evidence
        .reference_annotation
        .gff3_file
        .clone()
        .context("evidence.reference_annotation.gff3_file is not set")?;
    let locus_regex = config.orthologue_regex()?;
    ReferenceGff3 {
        path,
        locus_regex: &locus_regex,
    }
    .load()
}

fn ontology_context(config: &Config) -> Result<BTreeMap<String, OntologyContext>> {
    let ctx = &config.evidence.ontology_context;
    let path = config
        .ontology_annotation_file()
        .context("evidence.ontology_context.annotation_file is not set")?
        .to_path_buf();
    let locus_regex = config.orthologue_regex()?;
    OntologyAnnotationTable::new(path, &locus_regex, &ctx.keywords()).load()
}

/// Scores every base gene on all layers and selects the high-confidence subset.
/// Domain scan files go to `domain_work_dir`, or a scratch directory when it is `None`.
pub fn run_scoring(config: &Config, domain_work_dir: Option<&Path>) -> Result<RankingOutcome> {
    let mapper = config.id_mapper()?;
    info!("Gene ids normalised as <core>{}", mapper.suffix());
    let caps = &config.scoring.caps;
    let weights = &config.scoring.weights;

    step(1, "base GO term extraction");
    let annotations = load_go(config, &mapper)?;
    let genes = base_genes(&annotations);
    info!("Base genes: {}", genes.len());
    let mut table = init_table(&genes);

    step(2, "GO term scoring");
    scoring::go::score_go(&mut table, &annotations, &weights.go, caps.go_max);
    log_layer_summary(&table, EvidenceLayer::Go, caps.go_max);

    step(3, "domain evidence scoring");
    if config.domain_database.enabled {
        let scratch;
        let work_dir = match domain_work_dir {
            Some(dir) => dir,
            None => {
                scratch = TempDir::new()?;
                scratch.path()
            }
        };
        if let Some(hits) = optional_layer(
            EvidenceLayer::Domain,
            domain_hits(config, &mapper, &genes, work_dir),
        ) {
            scoring::domain::score_domains(
                &mut table,
                &hits,
                &config.domain_database.expected_domains,
                weights.domain_match.hit,
                caps.domain_max,
            );
        }
        log_layer_summary(&table, EvidenceLayer::Domain, caps.domain_max);
    } else {
        info!("Domain database disabled");
    }

    step(4, "orthology evidence scoring");
    if config.evidence.orthology.enabled {
        if let Some(records) =
            optional_layer(EvidenceLayer::Orthology, orthology_records(config, &mapper))
        {
            scoring::orthology::score_orthology(
                &mut table,
                records,
                &weights.orthology,
                caps.orthology_max,
            );
        }
        log_layer_summary(&table, EvidenceLayer::Orthology, caps.orthology_max);
    } else {
        info!("Orthology disabled");
    }

    step(5, "orthologue annotation keyword scoring");
    let reference = &config.evidence.reference_annotation;
    let mut references = BTreeMap::new();
    if reference.gff3_file.is_some()
        && (reference.enabled || config.evidence.orthology.enabled)
    {
        if let Some(loaded) =
            optional_layer(EvidenceLayer::Keyword, reference_annotations(config))
        {
            scoring::keywords::join_reference_annotations(&mut table, &loaded);
            references = loaded;
        }
    }
    if reference.enabled {
        if reference.keywords.is_empty() {
            warn!("No orthologue annotation keywords configured");
        }
        scoring::keywords::score_keywords(
            &mut table,
            &references,
            &reference.keywords,
            weights.tair_keywords.hit,
            caps.tair_max,
        );
        log_layer_summary(&table, EvidenceLayer::Keyword, caps.tair_max);
    } else {
        info!("Orthologue annotation keywords disabled");
    }

    step(6, "ontology context scoring");
    if config.evidence.ontology_context.enabled {
        if let Some(context) = optional_layer(EvidenceLayer::Context, ontology_context(config)) {
            scoring::ontology_context::score_context(
                &mut table,
                &context,
                weights.po_keywords.hit,
                caps.po_max,
            );
        }
        log_layer_summary(&table, EvidenceLayer::Context, caps.po_max);
    } else {
        info!("Ontology context disabled");
    }

    step(7, "synergy bonus detection");
    if config.scoring.synergy_rules.is_empty() {
        info!("No synergy rules defined");
    }
    scoring::synergy::score_synergy(&mut table, &config.scoring.synergy_rules, caps.synergy_max);
    log_layer_summary(&table, EvidenceLayer::Synergy, caps.synergy_max);

    step(8, "total scores and selection");
    let mut ranked = aggregate_totals(&table);
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let selection = select_high_confidence(&ranked, &config.selection)?;
    info!(
        "Selected {}/{} genes by {}",
        selection.genes.len(),
        ranked.len(),
        selection.method
    );

    Ok(RankingOutcome {
        genes,
        table,
        ranked,
        selection,
    })
}

/// Full `rank` run: run directory, scoring, reports, optional QC, manifest, `latest`.
pub fn run(doc: &ConfigDocument, options: &RunOptions) -> Result<RunDirectory> {
    let config = &doc.config;
    let id = run_id(
        &Local::now(),
        &config.output_prefix,
        &config_hash(&doc.raw)?,
        options.run_name.as_deref(),
    );
    let run = create_run_dir(&options.results_dir, id, options.overwrite)?;
    info!("Run ID: {}", run.run_id);
    let snapshot = write_config_snapshot(&run, &doc.raw)?;

    let outcome = run_scoring(config, Some(&run.domain_scan))?;

    step(9, "writing outputs");
    let writer = ReportWriter {
        outputs: &run.outputs,
        prefix: &config.output_prefix,
        float_precision: config.output.float_precision,
    };
    let mut entries =
        writer.write_all(&outcome.table, &outcome.genes, &outcome.ranked, &outcome.selection)?;
    entries.push(ManifestEntry::new(snapshot, "Configuration snapshot for this run", None));
    for name in ["query_proteins.fa", "domains.domtbl"] {
        let path = run.domain_scan.join(name);
        if path.is_file() {
            entries.push(ManifestEntry::new(path, "Domain scan input/output", None));
        }
    }

    if options.qc {
        step(10, "QC diagnostics");
        entries.extend(write_qc(
            &run.qc,
            &config.output_prefix,
            &outcome.table,
            &outcome.ranked,
        )?);
    }

    write_manifest(&run, &entries)?;
    update_latest(&options.results_dir, &run)?;
    info!("Run completed: {}", run.run_id);
    Ok(run)
}

/// Writes the GO base list as `gene` / `category` / `description` and logs per-term and
/// per-category gene counts.
pub fn extract_go_list(config: &Config, output: &Path) -> Result<usize> {
    let mapper = config.id_mapper()?;
    let annotations = load_go(config, &mapper)?;
    let genes = base_genes(&annotations);
    let mut table = init_table(&genes);
    scoring::go::score_go(
        &mut table,
        &annotations,
        &config.scoring.weights.go,
        config.scoring.caps.go_max,
    );

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    writer.write_record(["gene", "category", "description"])?;

    let mut per_category: BTreeMap<String, usize> = BTreeMap::new();
    for (gene, record) in &table {
        let go = &record.evidence.go;
        let category = if go.categories.is_empty() {
            "Unclassified".to_string()
        } else {
            go.categories.join(", ")
        };
        for c in &go.categories {
            *per_category.entry(c.clone()).or_default() += 1;
        }
        let descriptions: BTreeSet<&str> = go
            .terms
            .iter()
            .filter_map(|t| config.go_term_descriptions.get(t).map(String::as_str))
            .collect();
        let description = if descriptions.is_empty() {
            "Unknown".to_string()
        } else {
            descriptions.into_iter().collect::<Vec<_>>().join("; ")
        };
        writer.write_record([gene.as_str(), category.as_str(), description.as_str()])?;
    }
    writer.flush()?;
    info!("{} genes written to {}", genes.len(), output.display());

    let mut per_term: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for a in &annotations {
        per_term.entry(a.term.as_str()).or_default().insert(a.gene.as_str());
    }
    let mut by_count: Vec<(&str, usize)> = per_term.iter().map(|(t, g)| (*t, g.len())).collect();
    by_count.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    for (term, count) in by_count {
        let description = config
            .go_term_descriptions
            .get(term)
            .map(String::as_str)
            .unwrap_or("Unknown");
        info!("  {}: {:4} genes - {}", term, count, description);
    }
    for (category, count) in &per_category {
        info!("  {}: {} genes", category, count);
    }

    Ok(genes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const GO_TABLE: &str = "gene\tGO\tlevel\n\
        Bd1G00010.1.p\tGO:0012501\tBP\n\
        Bd1G00010.1.p\tGO:0000302\tBP\n\
        Bd1G00020.1.p\tGO:0000302\tBP\n\
        Bd1G00030.1.p\tGO:0000302\tMF\n\
        Bd1G00040.1.p\tGO:9999999\tBP\n";

    fn config_text(dir: &Path, extra: &str) -> String {
        format!(
            r#"
output_prefix: test
input_go_file: {go}
id_mapping: {{ regex: '(Bd\dG\d{{5}})', suffix: '.v1' }}
scoring:
  weights:
    go: {{ PCD: {{ "GO:0012501": 3 }}, ROS: {{ "GO:0000302": 2 }} }}
  caps: {{ go_max: 6, domain_max: 5, orthology_max: 4, tair_max: 4, po_max: 2, synergy_max: 6 }}
{extra}"#,
            go = dir.join("go.tsv").display(),
        )
    }

    fn setup(extra: &str) -> (TempDir, ConfigDocument) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.tsv"), GO_TABLE).unwrap();
        let doc = ConfigDocument::parse(&config_text(dir.path(), extra)).unwrap();
        (dir, doc)
    }

    fn domtbl_row(query: &str, acc: &str) -> String {
        format!(
            "dom {acc} 200 {query} - 300 1e-40 140.2 0.1 1 1 1e-35 1e-30 120.5 0.2 3 240 10 250 8 248 0.95 desc"
        )
    }

    #[test]
    fn go_table_yields_two_base_genes() {
        let (_dir, doc) = setup("");
        let outcome = run_scoring(&doc.config, None).unwrap();
        assert_eq!(outcome.genes, vec!["Bd1G00010.v1", "Bd1G00020.v1"]);
        let g1 = &outcome.table["Bd1G00010.v1"];
        assert_eq!(g1.scores.get(EvidenceLayer::Go).raw, 5.0);
        assert_eq!(g1.evidence.go.category_label(), "PCD-ROS");
        assert_eq!(outcome.ranked[0], ("Bd1G00010.v1".to_string(), 5.0));
    }

    #[test]
    fn domain_raw_score_is_capped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.tsv"), GO_TABLE).unwrap();
        let rows: Vec<String> = (1..=6)
            .map(|i| domtbl_row("Bd1G00020.1.p", &format!("PF0000{i}.3")))
            .collect();
        fs::write(dir.path().join("pre.domtbl"), rows.join("\n")).unwrap();
        let extra = format!(
            "domain_database:\n  enabled: true\n  precomputed_domtbl: {}\n  expected_domains: {{ ROS: [PF00001, PF00002, PF00003, PF00004, PF00005, PF00006] }}\n",
            dir.path().join("pre.domtbl").display()
        );
        let doc = ConfigDocument::parse(&config_text(dir.path(), &extra)).unwrap();

        let outcome = run_scoring(&doc.config, None).unwrap();
        let domain = outcome.table["Bd1G00020.v1"].scores.get(EvidenceLayer::Domain);
        assert_eq!(domain.raw, 12.0);
        assert_eq!(domain.capped, 5.0);

        let options = RunOptions {
            results_dir: dir.path().join("results"),
            run_name: None,
            overwrite: false,
            qc: false,
        };
        let run = run(&doc, &options).unwrap();
        let scored = crate::helper_functions::read_tsv(&run.outputs.join("test_genes.scored.tsv"))
            .unwrap();
        let genes = crate::helper_functions::string_column(&scored, "gene_id").unwrap();
        let raw = crate::helper_functions::string_column(&scored, "domain_score_raw").unwrap();
        let capped =
            crate::helper_functions::string_column(&scored, "domain_score_capped").unwrap();
        let row = genes.iter().position(|g| g == "Bd1G00020.v1").unwrap();
        assert_abs_diff_eq!(raw[row].parse::<f64>().unwrap(), 12.0);
        assert_abs_diff_eq!(capped[row].parse::<f64>().unwrap(), 5.0);
    }

    #[test]
    fn failing_optional_layer_scores_zero() {
        let (_dir, doc) = setup(
            "domain_database: { enabled: true, precomputed_domtbl: /no/such.domtbl }\n\
             evidence:\n  orthology: { enabled: true, orthology_file: /no/such.tsv }\n",
        );
        let outcome = run_scoring(&doc.config, None).unwrap();
        for record in outcome.table.values() {
            assert_eq!(record.scores.get(EvidenceLayer::Domain).raw, 0.0);
            assert_eq!(record.scores.get(EvidenceLayer::Orthology).raw, 0.0);
        }
    }

    #[test]
    fn missing_go_file_is_fatal() {
        let (dir, doc) = setup("");
        fs::remove_file(dir.path().join("go.tsv")).unwrap();
        assert!(run_scoring(&doc.config, None).is_err());
    }

    #[test]
    fn synergy_rule_adds_bonus() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.tsv"), GO_TABLE).unwrap();
        fs::write(dir.path().join("pre.domtbl"), domtbl_row("Bd1G00010.1.p", "PF00656.26"))
            .unwrap();
        let extra = format!(
            "  synergy_rules:\n    - {{ name: pcd_domain, if_all: [has_PCD_GO, has_expected_domain], bonus: 3 }}\n\
             domain_database:\n  enabled: true\n  precomputed_domtbl: {}\n  expected_domains: {{ PCD: [PF00656] }}\n",
            dir.path().join("pre.domtbl").display()
        );
        let doc = ConfigDocument::parse(&config_text(dir.path(), &extra)).unwrap();

        let outcome = run_scoring(&doc.config, None).unwrap();
        let g1 = &outcome.table["Bd1G00010.v1"];
        assert_eq!(g1.evidence.synergy.triggered, vec!["pcd_domain"]);
        assert_eq!(g1.scores.get(EvidenceLayer::Synergy).capped, 3.0);
        assert_eq!(g1.scores.total(), 5.0 + 2.0 + 3.0);
        assert_eq!(outcome.table["Bd1G00020.v1"].scores.get(EvidenceLayer::Synergy).raw, 0.0);
    }

    #[test]
    fn full_run_writes_outputs_and_totals_round_trip() {
        let (dir, doc) = setup("selection: { mode: quantile, quantile: 0.5 }\n");
        let options = RunOptions {
            results_dir: dir.path().join("results"),
            run_name: Some("e2e".into()),
            overwrite: false,
            qc: false,
        };
        let run = run(&doc, &options).unwrap();

        assert!(run.run_id.ends_with("__e2e"));
        assert!(run.root.join("config_used.yaml").is_file());
        assert!(run.outputs.join("manifest.json").is_file());
        let high = fs::read_to_string(run.outputs.join("test_genes.high_confidence.txt")).unwrap();
        assert_eq!(high, "Bd1G00010.v1\n");

        let scored = crate::helper_functions::read_tsv(&run.outputs.join("test_genes.scored.tsv"))
            .unwrap();
        let genes = crate::helper_functions::string_column(&scored, "gene_id").unwrap();
        let totals = crate::helper_functions::string_column(&scored, "total_score").unwrap();
        assert_eq!(genes, vec!["Bd1G00010.v1", "Bd1G00020.v1"]);
        let parsed: Vec<f64> = totals.iter().map(|t| t.parse().unwrap()).collect();
        assert_abs_diff_eq!(parsed[0], 5.0);
        assert_abs_diff_eq!(parsed[1], 2.0);

        let overview =
            fs::read_to_string(run.outputs.join("test_genes.ALL_overview.tsv")).unwrap();
        assert!(overview.contains("PCD+ROS_GO"));
    }

    #[test]
    fn knee_threshold_falls_in_window() {
        let dir = TempDir::new().unwrap();
        let mut go = String::from("gene\tGO\tlevel\n");
        for i in 0..30 {
            go.push_str(&format!("Bd1G{:05}.1\tGO:0000302\tBP\n", i));
            if i < 6 {
                go.push_str(&format!("Bd1G{:05}.1\tGO:0012501\tBP\n", i));
            }
        }
        fs::write(dir.path().join("go.tsv"), go).unwrap();
        let doc = ConfigDocument::parse(&config_text(dir.path(), "")).unwrap();

        let outcome = run_scoring(&doc.config, None).unwrap();
        let sorted: Vec<f64> = outcome.ranked.iter().map(|(_, s)| *s).collect();
        let window = &sorted[3..9];
        assert!(window.contains(&outcome.selection.threshold));
        assert!(outcome
            .ranked
            .iter()
            .filter(|(_, s)| *s >= outcome.selection.threshold)
            .all(|(g, _)| outcome.selection.genes.contains(g)));
    }

    #[test]
    fn extract_writes_gene_category_description() {
        let (dir, doc) = setup("go_term_descriptions: { \"GO:0012501\": programmed cell death }\n");
        let out = dir.path().join("list.tsv");
        assert_eq!(extract_go_list(&doc.config, &out).unwrap(), 2);
        let text = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "gene\tcategory\tdescription");
        assert_eq!(lines[1], "Bd1G00010.v1\tPCD, ROS\tprogrammed cell death");
        assert_eq!(lines[2], "Bd1G00020.v1\tROS\tUnknown");
    }
}
