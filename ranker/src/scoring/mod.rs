//! Per-layer evidence scorers.
//!
//! Every scorer takes the shared [`EvidenceTable`] by `&mut`, writes only its own
//! evidence sub-record and its own [`EvidenceLayer`] score, and leaves the rest alone.

pub mod domain;
pub mod go;
pub mod keywords;
pub mod ontology_context;
pub mod orthology;
pub mod synergy;

use statrs::statistics::Statistics;
use tracing::info;

use crate::models::{EvidenceLayer, EvidenceTable, GeneId, GeneRecord};

/// Fresh, zero-scored records for the base gene universe.
pub fn init_table(genes: &[GeneId]) -> EvidenceTable {
    genes
        .iter()
        .map(|g| (g.clone(), GeneRecord::default()))
        .collect()
}

/// `(gene, total)` for every gene, in gene-id order.
pub fn aggregate_totals(table: &EvidenceTable) -> Vec<(GeneId, f64)> {
    table
        .iter()
        .map(|(gene, record)| (gene.clone(), record.scores.total()))
        .collect()
}

/// Logs the raw and capped distribution of one layer.
pub fn log_layer_summary(table: &EvidenceTable, layer: EvidenceLayer, cap: f64) {
    if table.is_empty() {
        info!("{} layer: no genes", layer);
        return;
    }
    let raw: Vec<f64> = table.values().map(|r| r.scores.get(layer).raw).collect();
    let capped: Vec<f64> = table.values().map(|r| r.scores.get(layer).capped).collect();
    let with_evidence = raw.iter().filter(|s| **s > 0.0).count();
    let at_cap = raw.iter().filter(|s| **s > cap).count();

    info!(
        "{} layer: {} genes with evidence; raw min={:.1} max={:.1} mean={:.2}; capped (max={}) mean={:.2}; {} over cap",
        layer,
        with_evidence,
        Statistics::min(raw.iter()),
        Statistics::max(raw.iter()),
        raw.iter().mean(),
        cap,
        capped.iter().mean(),
        at_cap
    );
}
