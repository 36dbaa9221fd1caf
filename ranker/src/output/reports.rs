use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;
use serde::Serialize;
use statrs::statistics::{Data, Median, Statistics};
use tracing::info;

use crate::helper_functions::write_tsv;
use crate::models::{
    EvidenceLayer, EvidenceTable, GeneEvidence, GeneId, GeneRecord, OrthologyClass,
};
use crate::output::run_manager::ManifestEntry;
use crate::selection::Selection;

/// Writes the gene tables of one run into `outputs/`.
pub struct ReportWriter<'a> {
    pub outputs: &'a Path,
    pub prefix: &'a str,
    pub float_precision: Option<usize>,
}

/// `PCD+ROS_GO; Domain; TAIR_keywords; 1:1_AT1G01010`, or `GO_only` when nothing applies.
pub fn evidence_summary(evidence: &GeneEvidence) -> String {
    let mut parts = Vec::new();
    if !evidence.go.categories.is_empty() {
        parts.push(format!("{}_GO", evidence.go.categories.join("+")));
    }
    if !evidence.domain.matched.is_empty() {
        parts.push("Domain".to_string());
    }
    if !evidence.keyword_hits.is_empty() {
        parts.push("TAIR_keywords".to_string());
    }
    match evidence.orthology.as_ref().map(|o| o.class) {
        Some(OrthologyClass::OneToOne) => {
            parts.push(format!("1:1_{}", evidence.best_orthologue().unwrap_or_default()))
        }
        Some(OrthologyClass::OneToMany) => parts.push("1:many_ortho".to_string()),
        _ => {}
    }
    if parts.is_empty() {
        "GO_only".to_string()
    } else {
        parts.join("; ")
    }
}

fn text_column<F>(name: &str, table: &EvidenceTable, genes: &[GeneId], f: F) -> Column
where
    F: Fn(&GeneEvidence) -> String,
{
    let values: Vec<String> = genes.iter().map(|g| f(&table[g].evidence)).collect();
    Column::new(name.into(), values)
}

fn score_column<F>(name: &str, table: &EvidenceTable, genes: &[GeneId], f: F) -> Column
where
    F: Fn(&GeneRecord) -> f64,
{
    let values: Vec<f64> = genes.iter().map(|g| f(&table[g])).collect();
    Column::new(name.into(), values)
}

fn reference_symbol(e: &GeneEvidence) -> String {
    e.reference.as_ref().map(|r| r.symbol.clone()).unwrap_or_default()
}

fn reference_description(e: &GeneEvidence) -> String {
    e.reference.as_ref().map(|r| r.description.clone()).unwrap_or_default()
}

/// `AT1G01010:1.000, AT2G02020:0.950` in table order.
fn orthologue_hits(e: &GeneEvidence) -> String {
    e.orthology
        .as_ref()
        .map(|o| {
            o.orthologues
                .iter()
                .zip(&o.scores)
                .map(|(id, score)| format!("{id}:{score:.3}"))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn best_orthologue_score(e: &GeneEvidence) -> f64 {
    e.orthology.as_ref().map_or(0.0, |o| o.best_score)
}

/// Every raw and capped sub-score with its evidence strings, one row per gene in `genes` order.
pub fn scored_frame(table: &EvidenceTable, genes: &[GeneId]) -> Result<DataFrame> {
    let mut columns = vec![
        Column::new("gene_id".into(), genes.to_vec()),
        text_column("go_terms", table, genes, |e| {
            e.go.terms.iter().cloned().collect::<Vec<_>>().join(", ")
        }),
        text_column("go_category", table, genes, |e| e.go.category_label()),
    ];

    let layer_columns = |layer: EvidenceLayer| {
        let prefix = layer.column_prefix();
        [
            score_column(&format!("{prefix}_score_raw"), table, genes, move |r| {
                r.scores.get(layer).raw
            }),
            score_column(&format!("{prefix}_score_capped"), table, genes, move |r| {
                r.scores.get(layer).capped
            }),
        ]
    };

    columns.extend(layer_columns(EvidenceLayer::Go));
    columns.push(text_column("domain_hits", table, genes, |e| e.domain.matched.join(", ")));
    columns.extend(layer_columns(EvidenceLayer::Domain));
    columns.push(text_column("best_orthologue", table, genes, |e| {
        e.best_orthologue().unwrap_or_default().to_string()
    }));
    columns.push(score_column("best_orthologue_score", table, genes, |r| {
        best_orthologue_score(&r.evidence)
    }));
    columns.push(text_column("orthology_class", table, genes, |e| {
        e.orthology_class().to_string()
    }));
    columns.push(text_column("orthologue_hits", table, genes, orthologue_hits));
    columns.extend(layer_columns(EvidenceLayer::Orthology));
    columns.push(text_column("reference_symbol", table, genes, reference_symbol));
    columns.push(text_column("reference_description", table, genes, reference_description));
    columns.push(text_column("keyword_hits", table, genes, |e| e.keyword_hits.join(", ")));
    columns.extend(layer_columns(EvidenceLayer::Keyword));
    columns.push(text_column("context_terms", table, genes, |e| e.context.terms.join(", ")));
    columns.push(text_column("context_hits", table, genes, |e| e.context.hits.join(", ")));
    columns.extend(layer_columns(EvidenceLayer::Context));
    columns.push(text_column("synergy_triggers", table, genes, |e| {
        e.synergy.triggered.join(", ")
    }));
    columns.extend(layer_columns(EvidenceLayer::Synergy));
    columns.push(score_column("total_score", table, genes, |r| r.scores.total()));

    Ok(DataFrame::new(columns)?)
}

/// Capped scores with the aggregated annotations and an `evidence_summary` column.
pub fn overview_frame(table: &EvidenceTable, genes: &[GeneId]) -> Result<DataFrame> {
    let capped = |layer: EvidenceLayer| {
        score_column(&format!("{}_score", layer.column_prefix()), table, genes, move |r| {
            r.scores.get(layer).capped
        })
    };

    let mut columns = vec![
        Column::new("gene_id".into(), genes.to_vec()),
        score_column("total_score", table, genes, |r| r.scores.total()),
    ];
    columns.extend(EvidenceLayer::ALL.into_iter().map(capped));
    columns.extend([
        text_column("go_terms", table, genes, |e| {
            e.go.terms.iter().cloned().collect::<Vec<_>>().join(", ")
        }),
        text_column("domain_hits", table, genes, |e| e.domain.matched.join(", ")),
        text_column("best_orthologue", table, genes, |e| {
            e.best_orthologue().unwrap_or_default().to_string()
        }),
        score_column("best_orthologue_score", table, genes, |r| {
            best_orthologue_score(&r.evidence)
        }),
        text_column("orthology_class", table, genes, |e| e.orthology_class().to_string()),
        text_column("orthologues", table, genes, |e| {
            e.orthology.as_ref().map(|o| o.orthologues.join(", ")).unwrap_or_default()
        }),
        text_column("reference_symbol", table, genes, reference_symbol),
        text_column("reference_description", table, genes, reference_description),
        text_column("context_hits", table, genes, |e| e.context.hits.join(", ")),
        text_column("evidence_summary", table, genes, evidence_summary),
    ]);

    Ok(DataFrame::new(columns)?)
}

#[derive(Debug, Serialize)]
struct CategoryRow<'a> {
    gene_id: &'a str,
    category: String,
}

impl ReportWriter<'_> {
    fn path(&self, suffix: &str) -> PathBuf {
        self.outputs.join(format!("{}_genes.{}", self.prefix, suffix))
    }

    fn write_ids(&self, path: &Path, genes: &[GeneId]) -> Result<()> {
        let mut text = genes.join("\n");
        text.push('\n');
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
    }

    fn write_frame(&self, path: &Path, mut df: DataFrame) -> Result<()> {
        write_tsv(&mut df, path, self.float_precision)?;
        info!("Wrote {} ({} genes)", path.display(), df.height());
        Ok(())
    }

    /// Light `gene_id` / `category` table for the high-confidence genes.
    fn write_categories(&self, path: &Path, table: &EvidenceTable, genes: &[GeneId]) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for gene in genes {
            let category = table[gene].evidence.go.category_label();
            *counts.entry(category.clone()).or_default() += 1;
            writer.serialize(CategoryRow { gene_id: gene, category })?;
        }
        writer.flush()?;
        let summary: Vec<String> = counts.iter().map(|(c, n)| format!("{c}={n}")).collect();
        info!("High-confidence categories: {}", summary.join(", "));
        Ok(())
    }

    fn write_selection_summary(
        &self,
        path: &Path,
        ranked: &[(GeneId, f64)],
        selection: &Selection,
    ) -> Result<()> {
        let scores: Vec<f64> = ranked.iter().map(|(_, s)| *s).collect();
        let total = ranked.len();
        let selected = selection.genes.len();
        let share = if total == 0 { 0.0 } else { selected as f64 / total as f64 * 100.0 };

        let mut text = String::new();
        text.push_str("HIGH-CONFIDENCE GENE SELECTION\n");
        text.push_str(&"=".repeat(80));
        text.push_str("\n\n");
        text.push_str(&format!("Method: {}\n", selection.method));
        text.push_str(&format!("Total genes: {total}\n"));
        text.push_str(&format!("High-confidence: {selected} ({share:.1}%)\n\n"));
        if !scores.is_empty() {
            text.push_str("Score stats (all genes):\n");
            text.push_str(&format!(
                "  Min: {:.1}, Max: {:.1}\n",
                Statistics::min(scores.iter()),
                Statistics::max(scores.iter())
            ));
            text.push_str(&format!(
                "  Mean: {:.1}, Median: {:.1}\n",
                scores.iter().mean(),
                Data::new(scores.clone()).median()
            ));
        }
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Writes every gene table and returns their manifest entries.
    pub fn write_all(
        &self,
        table: &EvidenceTable,
        base_genes: &[GeneId],
        ranked: &[(GeneId, f64)],
        selection: &Selection,
    ) -> Result<Vec<ManifestEntry>> {
        let order: Vec<GeneId> = ranked.iter().map(|(g, _)| g.clone()).collect();
        let n_all = order.len();
        let n_high = selection.genes.len();
        let mut entries = Vec::new();

        let base = self.path("base.txt");
        self.write_ids(&base, base_genes)?;
        entries.push(ManifestEntry::new(base, "Base gene list (IDs only)", Some(base_genes.len())));

        let scored = self.path("scored.tsv");
        self.write_frame(&scored, scored_frame(table, &order)?)?;
        entries.push(ManifestEntry::new(scored, "Complete scored table with all evidence", Some(n_all)));

        let overview = self.path("ALL_overview.tsv");
        self.write_frame(&overview, overview_frame(table, &order)?)?;
        entries.push(ManifestEntry::new(overview, "Enriched overview table for all genes", Some(n_all)));

        let high = self.path("high_confidence.txt");
        self.write_ids(&high, &selection.genes)?;
        entries.push(ManifestEntry::new(high, "High-confidence genes (IDs only)", Some(n_high)));

        let summary = self.path("high_confidence.summary.txt");
        self.write_selection_summary(&summary, ranked, selection)?;
        entries.push(ManifestEntry::new(summary, "Selection method and statistics", None));

        if !selection.genes.is_empty() {
            let high_scored = self.path("HIGH_scored.tsv");
            self.write_frame(&high_scored, scored_frame(table, &selection.genes)?)?;
            entries.push(ManifestEntry::new(
                high_scored,
                "Scored table for high-confidence genes",
                Some(n_high),
            ));

            let high_overview = self.path("HIGH_overview.tsv");
            self.write_frame(&high_overview, overview_frame(table, &selection.genes)?)?;
            entries.push(ManifestEntry::new(
                high_overview,
                "Enriched overview table for high-confidence genes",
                Some(n_high),
            ));

            let categories = self.path("HIGH_category.tsv");
            self.write_categories(&categories, table, &selection.genes)?;
            entries.push(ManifestEntry::new(
                categories,
                "High-confidence genes with GO category",
                Some(n_high),
            ));
        }
        Ok(entries)
    }
}
