//! Typed run configuration.
//!
//! The YAML document is deserialised once at startup into [`Config`] and validated by
//! [`Config::validate`]. Every threshold that may be omitted has its default written
//! down here, so components never fall back to ad-hoc values of their own.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::id_mapping::IdMapper;
use crate::models::EvidenceLayer;
use crate::scoring::synergy::{SynergyCondition, SynergyRule};

// ─── Defaults ────────────────────────────────────────────────────────────────
const DEFAULT_OUTPUT_PREFIX: &str = "gene_signatures";
const DEFAULT_GO_LEVEL: &str = "BP";
const DEFAULT_ORTHOLOGUE_REGEX: &str = r"AT[1-5MC]G\d{5}";
const DEFAULT_CONTEXT_KEYWORDS: [&str; 6] = [
    "senescence",
    "senescent",
    "cell death",
    "hypersensitive",
    "dying",
    "necrosis",
];

fn default_output_prefix() -> String {
    DEFAULT_OUTPUT_PREFIX.to_string()
}
fn default_go_level() -> Option<String> {
    Some(DEFAULT_GO_LEVEL.to_string())
}
fn default_orthologue_regex() -> String {
    DEFAULT_ORTHOLOGUE_REGEX.to_string()
}
fn default_hmmscan_binary() -> String {
    "hmmscan".to_string()
}
fn default_evalue() -> f64 {
    1e-5
}
fn default_cpu() -> usize {
    4
}
fn default_min_best_score() -> f64 {
    0.8
}
fn default_min_second_best_gap() -> f64 {
    0.2
}
fn default_domain_hit() -> HitWeight {
    HitWeight { hit: 2.0 }
}
fn default_keyword_hit() -> HitWeight {
    HitWeight { hit: 2.0 }
}
fn default_context_hit() -> HitWeight {
    HitWeight { hit: 1.0 }
}
fn default_quantile() -> f64 {
    0.90
}
fn default_knee_window() -> (f64, f64) {
    (0.1, 0.3)
}

/// Accepts `1e-5` whether YAML resolved it as a float or left it as a string.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("expected a number, got `{s}`: {e}"))),
    }
}

// ─── Top level ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    pub input_go_file: PathBuf,
    pub id_mapping: IdMappingConfig,
    /// GO ontology level to keep (`BP`, `MF`, `CC`); `ALL` or null keeps every level.
    #[serde(default = "default_go_level")]
    pub go_level_filter: Option<String>,
    /// Human readable GO term names, used by the `extract` report.
    #[serde(default)]
    pub go_term_descriptions: BTreeMap<String, String>,
    #[serde(default)]
    pub domain_database: DomainDatabaseConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdMappingConfig {
    #[serde(alias = "protein_to_core_regex")]
    pub regex: String,
    #[serde(alias = "seurat_suffix")]
    pub suffix: String,
}

// ─── Domain layer ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DomainDatabaseConfig {
    #[serde(default)]
    pub enabled: bool,
    pub pfam_database: Option<PathBuf>,
    pub protein_fasta: Option<PathBuf>,
    /// Existing `--domtblout` table; skips the hmmscan run when set.
    pub precomputed_domtbl: Option<PathBuf>,
    #[serde(default = "default_hmmscan_binary")]
    pub hmmscan_binary: String,
    #[serde(default = "default_evalue", deserialize_with = "lenient_f64")]
    pub evalue_threshold: f64,
    #[serde(default = "default_cpu")]
    pub cpu: usize,
    /// GO category → Pfam ids that count as supporting evidence.
    #[serde(default)]
    pub expected_domains: BTreeMap<String, Vec<String>>,
}

impl Default for DomainDatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pfam_database: None,
            protein_fasta: None,
            precomputed_domtbl: None,
            hmmscan_binary: default_hmmscan_binary(),
            evalue_threshold: default_evalue(),
            cpu: default_cpu(),
            expected_domains: BTreeMap::new(),
        }
    }
}

// ─── Secondary evidence ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default, alias = "orthology_evidence")]
    pub orthology: OrthologyConfig,
    #[serde(default, alias = "arabidopsis_context")]
    pub reference_annotation: ReferenceAnnotationConfig,
    #[serde(default, alias = "po_context")]
    pub ontology_context: OntologyContextConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrthologyConfig {
    #[serde(default)]
    pub enabled: bool,
    pub orthology_file: Option<PathBuf>,
    #[serde(default)]
    pub mapping_rules: MappingRules,
    #[serde(default)]
    pub classification: ClassificationThresholds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingRules {
    /// Locates the query-species id inside `OrtoA` (whole match); the located id is
    /// then passed through the id mapper.
    #[serde(alias = "brachy_id_regex_extract")]
    pub query_id_regex: Option<String>,
    /// Recognises reference-species orthologue ids in `OrtoB`, the GFF3 attributes and
    /// the ontology table.
    #[serde(default = "default_orthologue_regex", alias = "arabidopsis_id_regex_extract")]
    pub orthologue_id_regex: String,
}

impl Default for MappingRules {
    fn default() -> Self {
        Self {
            query_id_regex: None,
            orthologue_id_regex: default_orthologue_regex(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassificationThresholds {
    #[serde(default = "default_min_best_score")]
    pub min_best_score: f64,
    #[serde(default = "default_min_second_best_gap")]
    pub min_second_best_gap: f64,
    /// Upper bound on hits for a multi-hit row to still count as one-to-one. Unbounded when unset.
    #[serde(default)]
    pub max_hits: Option<usize>,
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        Self {
            min_best_score: default_min_best_score(),
            min_second_best_gap: default_min_second_best_gap(),
            max_hits: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferenceAnnotationConfig {
    #[serde(default)]
    pub enabled: bool,
    pub gff3_file: Option<PathBuf>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Older configs keep the ontology annotation table next to the GFF3.
    pub po_annotation_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OntologyContextConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(alias = "po_annotation_file")]
    pub annotation_file: Option<PathBuf>,
    pub keywords: Option<Vec<String>>,
}

impl OntologyContextConfig {
    pub fn keywords(&self) -> Vec<String> {
        match &self.keywords {
            Some(k) => k.clone(),
            None => DEFAULT_CONTEXT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ─── Scoring ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    pub weights: WeightsConfig,
    pub caps: CapsConfig,
    #[serde(default)]
    pub synergy_rules: Vec<SynergyRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct HitWeight {
    pub hit: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    /// GO category → (GO term → weight).
    pub go: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default = "default_domain_hit")]
    pub domain_match: HitWeight,
    #[serde(default)]
    pub orthology: OrthologyWeights,
    #[serde(default = "default_keyword_hit")]
    pub tair_keywords: HitWeight,
    #[serde(default = "default_context_hit")]
    pub po_keywords: HitWeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct OrthologyWeights {
    #[serde(default = "OrthologyWeights::default_multiplier")]
    pub best_hit_multiplier: f64,
    #[serde(default = "OrthologyWeights::default_bonus")]
    pub one_to_one_bonus: f64,
    #[serde(default = "OrthologyWeights::default_min_points")]
    pub min_best_score_for_points: f64,
}

impl OrthologyWeights {
    fn default_multiplier() -> f64 {
        3.0
    }
    fn default_bonus() -> f64 {
        1.0
    }
    fn default_min_points() -> f64 {
        0.5
    }
}

impl Default for OrthologyWeights {
    fn default() -> Self {
        Self {
            best_hit_multiplier: Self::default_multiplier(),
            one_to_one_bonus: Self::default_bonus(),
            min_best_score_for_points: Self::default_min_points(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CapsConfig {
    pub go_max: f64,
    pub domain_max: f64,
    pub orthology_max: f64,
    pub tair_max: f64,
    pub po_max: f64,
    pub synergy_max: f64,
}

impl CapsConfig {
    pub fn cap(&self, layer: EvidenceLayer) -> f64 {
        match layer {
            EvidenceLayer::Go => self.go_max,
            EvidenceLayer::Domain => self.domain_max,
            EvidenceLayer::Orthology => self.orthology_max,
            EvidenceLayer::Keyword => self.tair_max,
            EvidenceLayer::Context => self.po_max,
            EvidenceLayer::Synergy => self.synergy_max,
        }
    }
}

// ─── Selection & output ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Knee,
    Quantile,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub mode: SelectionMode,
    #[serde(default = "default_quantile")]
    pub quantile: f64,
    /// Fractions of the descending score list searched for the knee.
    #[serde(default = "default_knee_window")]
    pub knee_window: (f64, f64),
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            mode: SelectionMode::default(),
            quantile: default_quantile(),
            knee_window: default_knee_window(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OutputConfig {
    /// Decimal places for floats in the output tables; full precision when unset.
    pub float_precision: Option<usize>,
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// The typed configuration together with the raw document it came from.
/// The raw form is what gets hashed and snapshotted into the run directory.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    pub config: Config,
    pub raw: serde_yaml::Value,
}

impl ConfigDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)?;
        let config: Config = serde_yaml::from_value(raw.clone())?;
        config.validate()?;
        Ok(Self { config, raw })
    }
}

impl Config {
    pub fn id_mapper(&self) -> Result<IdMapper> {
        IdMapper::new(&self.id_mapping.regex, &self.id_mapping.suffix)
    }

    /// Every GO term that appears in any scoring category; defines the base gene universe.
    pub fn target_go_terms(&self) -> BTreeSet<String> {
        self.scoring
            .weights
            .go
            .values()
            .flat_map(|terms| terms.keys().cloned())
            .collect()
    }

    /// Upper-cased level filter, or `None` when every level is kept.
    pub fn level_filter(&self) -> Option<String> {
        self.go_level_filter
            .as_deref()
            .map(|l| l.trim().to_uppercase())
            .filter(|l| !l.is_empty() && l != "ALL")
    }

    /// Ontology annotation table, falling back to `reference_annotation.po_annotation_file`.
    pub fn ontology_annotation_file(&self) -> Option<&Path> {
        self.evidence
            .ontology_context
            .annotation_file
            .as_deref()
            .or(self.evidence.reference_annotation.po_annotation_file.as_deref())
    }

    pub fn orthologue_regex(&self) -> Result<Regex> {
        let pattern = &self.evidence.orthology.mapping_rules.orthologue_id_regex;
        Regex::new(pattern).with_context(|| format!("invalid orthologue id regex `{pattern}`"))
    }

    pub fn query_regex(&self) -> Result<Option<Regex>> {
        match &self.evidence.orthology.mapping_rules.query_id_regex {
            Some(pattern) => Ok(Some(
                Regex::new(pattern)
                    .with_context(|| format!("invalid query id regex `{pattern}`"))?,
            )),
            None => Ok(None),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.id_mapper()?;
        self.orthologue_regex()?;
        self.query_regex()?;

        ensure!(
            !self.target_go_terms().is_empty(),
            "scoring.weights.go must list at least one GO term"
        );
        for (category, terms) in &self.scoring.weights.go {
            for (term, weight) in terms {
                ensure_non_negative(*weight, &format!("scoring.weights.go.{category}.{term}"))?;
            }
        }

        let weights = &self.scoring.weights;
        ensure_non_negative(weights.domain_match.hit, "scoring.weights.domain_match.hit")?;
        ensure_non_negative(weights.tair_keywords.hit, "scoring.weights.tair_keywords.hit")?;
        ensure_non_negative(weights.po_keywords.hit, "scoring.weights.po_keywords.hit")?;
        ensure_non_negative(
            weights.orthology.best_hit_multiplier,
            "scoring.weights.orthology.best_hit_multiplier",
        )?;
        ensure_non_negative(
            weights.orthology.one_to_one_bonus,
            "scoring.weights.orthology.one_to_one_bonus",
        )?;

        for layer in EvidenceLayer::ALL {
            ensure_non_negative(self.scoring.caps.cap(layer), &format!("{layer} cap"))?;
        }
        for rule in &self.scoring.synergy_rules {
            ensure_non_negative(rule.bonus, &format!("synergy rule `{}` bonus", rule.name))?;
            for condition in &rule.if_all {
                if let SynergyCondition::Unrecognised(name) = condition {
                    warn!(
                        "Synergy rule `{}`: unrecognised condition `{}` always evaluates to false",
                        rule.name, name
                    );
                }
            }
        }

        let db = &self.domain_database;
        ensure!(
            db.evalue_threshold.is_finite() && db.evalue_threshold > 0.0,
            "domain_database.evalue_threshold must be > 0"
        );
        ensure!(db.cpu >= 1, "domain_database.cpu must be at least 1");

        let t = &self.evidence.orthology.classification;
        ensure!(
            t.min_best_score.is_finite() && t.min_second_best_gap.is_finite(),
            "orthology classification thresholds must be finite"
        );

        let sel = &self.selection;
        ensure!(
            sel.quantile > 0.0 && sel.quantile <= 1.0,
            "selection.quantile must be in (0, 1], got {}",
            sel.quantile
        );
        let (lo, hi) = sel.knee_window;
        ensure!(
            (0.0..1.0).contains(&lo) && lo < hi && hi <= 1.0,
            "selection.knee_window must satisfy 0 <= lo < hi <= 1, got [{lo}, {hi}]"
        );
        Ok(())
    }
}

fn ensure_non_negative(value: f64, what: &str) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "{what} must be a finite, non-negative number, got {value}"
    );
    Ok(())
}
