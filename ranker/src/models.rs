use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Canonical gene identifier (`core id + version suffix`).
pub type GeneId = String;

// ─────────────────────────────────────────────────────────────────────────────
// Evidence layers and scores
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EvidenceLayer {
    Go,
    Domain,
    Orthology,
    Keyword,
    Context,
    Synergy,
}

impl EvidenceLayer {
    pub const ALL: [EvidenceLayer; 6] = [
        EvidenceLayer::Go,
        EvidenceLayer::Domain,
        EvidenceLayer::Orthology,
        EvidenceLayer::Keyword,
        EvidenceLayer::Context,
        EvidenceLayer::Synergy,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Prefix used for the `<prefix>_score_raw` / `<prefix>_score_capped` output columns.
    pub fn column_prefix(self) -> &'static str {
        match self {
            EvidenceLayer::Go => "go",
            EvidenceLayer::Domain => "domain",
            EvidenceLayer::Orthology => "orthology",
            EvidenceLayer::Keyword => "keyword",
            EvidenceLayer::Context => "context",
            EvidenceLayer::Synergy => "synergy",
        }
    }
}

impl fmt::Display for EvidenceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvidenceLayer::Go => "GO",
            EvidenceLayer::Domain => "domain",
            EvidenceLayer::Orthology => "orthology",
            EvidenceLayer::Keyword => "orthologue keyword",
            EvidenceLayer::Context => "ontology context",
            EvidenceLayer::Synergy => "synergy",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayerScore {
    pub raw: f64,
    pub capped: f64,
}

impl LayerScore {
    pub fn capped_at(raw: f64, cap: f64) -> Self {
        Self { raw, capped: raw.min(cap) }
    }
}

/// Per-gene `{raw, capped}` pair for every evidence layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreVector {
    layers: [LayerScore; 6],
}

impl ScoreVector {
    pub fn set(&mut self, layer: EvidenceLayer, raw: f64, cap: f64) {
        self.layers[layer.index()] = LayerScore::capped_at(raw, cap);
    }

    pub fn get(&self, layer: EvidenceLayer) -> LayerScore {
        self.layers[layer.index()]
    }

    /// Sum of the capped scores over all six layers.
    pub fn total(&self) -> f64 {
        self.layers.iter().map(|l| l.capped).sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsed evidence records
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct GoAnnotation {
    pub gene: GeneId,
    pub term: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainHit {
    pub gene: GeneId,
    /// Accession without version, e.g. `PF00656`.
    pub pfam_id: String,
    pub name: String,
    /// Independent domain e-value; the filter criterion.
    pub evalue: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrthologyClass {
    OneToOne,
    OneToMany,
    LowConfidence,
}

impl OrthologyClass {
    pub fn as_str(self) -> &'static str {
        match self {
            OrthologyClass::OneToOne => "one_to_one",
            OrthologyClass::OneToMany => "one_to_many",
            OrthologyClass::LowConfidence => "low_confidence",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrthologyRecord {
    /// Orthologue ids in the order they appear in the table.
    pub orthologues: Vec<String>,
    /// Score of each entry in `orthologues`.
    pub scores: Vec<f64>,
    pub best_score: f64,
    pub class: OrthologyClass,
}

impl OrthologyRecord {
    pub fn best_orthologue(&self) -> Option<&str> {
        self.orthologues.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceAnnotation {
    pub symbol: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OntologyContext {
    pub terms: Vec<String>,
    pub hits: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-gene evidence accumulator
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct GoEvidence {
    pub terms: BTreeSet<String>,
    pub categories: Vec<String>,
}

impl GoEvidence {
    /// `unknown`, the single category, or the sorted categories joined by `-`.
    pub fn category_label(&self) -> String {
        match self.categories.len() {
            0 => "unknown".to_string(),
            1 => self.categories[0].clone(),
            _ => {
                let mut cats = self.categories.clone();
                cats.sort();
                cats.join("-")
            }
        }
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DomainEvidence {
    pub matched_ids: BTreeSet<String>,
    /// `PF00656(Peptidase_C14,E=1.2e-30)` per matching hit, sorted.
    pub matched: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SynergyRecord {
    pub triggered: Vec<String>,
}

/// Everything collected for one gene. Each field has exactly one writer in the pipeline.
#[derive(Debug, Clone, Default)]
pub struct GeneEvidence {
    pub go: GoEvidence,
    pub domain: DomainEvidence,
    pub orthology: Option<OrthologyRecord>,
    /// Reference annotation of the best orthologue.
    pub reference: Option<ReferenceAnnotation>,
    pub keyword_hits: Vec<String>,
    pub context: OntologyContext,
    pub synergy: SynergyRecord,
}

impl GeneEvidence {
    pub fn best_orthologue(&self) -> Option<&str> {
        self.orthology.as_ref().and_then(|o| o.best_orthologue())
    }

    pub fn orthology_class(&self) -> &'static str {
        self.orthology
            .as_ref()
            .map(|o| o.class.as_str())
            .unwrap_or("none")
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeneRecord {
    pub evidence: GeneEvidence,
    pub scores: ScoreVector,
}

pub type EvidenceTable = BTreeMap<GeneId, GeneRecord>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capped_never_exceeds_cap() {
        let mut v = ScoreVector::default();
        v.set(EvidenceLayer::Domain, 12.0, 5.0);
        v.set(EvidenceLayer::Go, 2.0, 6.0);
        assert_eq!(v.get(EvidenceLayer::Domain), LayerScore { raw: 12.0, capped: 5.0 });
        assert_eq!(v.get(EvidenceLayer::Go).capped, 2.0);
        assert_eq!(v.total(), 7.0);
    }

    #[test]
    fn category_label_joins_sorted() {
        let mut go = GoEvidence::default();
        assert_eq!(go.category_label(), "unknown");
        go.categories = vec!["ROS".into(), "PCD".into()];
        assert_eq!(go.category_label(), "PCD-ROS");
    }
}
