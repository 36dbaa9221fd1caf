use std::collections::BTreeMap;

use crate::helper_functions::truncate_chars;
use crate::models::{EvidenceLayer, EvidenceTable, ReferenceAnnotation};

const MAX_DESCRIPTION_CHARS: usize = 200;

/// Copies the best orthologue's reference annotation onto each gene.
pub fn join_reference_annotations(
    table: &mut EvidenceTable,
    annotations: &BTreeMap<String, ReferenceAnnotation>,
) {
    for record in table.values_mut() {
        let Some(reference) = record
            .evidence
            .best_orthologue()
            .and_then(|id| annotations.get(id))
        else {
            continue;
        };
        record.evidence.reference = Some(ReferenceAnnotation {
            symbol: reference.symbol.clone(),
            description: truncate_chars(&reference.description, MAX_DESCRIPTION_CHARS),
        });
    }
}

/// Case-insensitive literal keyword search over the best orthologue's full
/// `symbol + " " + description`.
pub fn score_keywords(
    table: &mut EvidenceTable,
    annotations: &BTreeMap<String, ReferenceAnnotation>,
    keywords: &[String],
    hit_weight: f64,
    cap: f64,
) {
    let lowered: Vec<(String, &String)> = keywords
        .iter()
        .map(|k| (k.to_lowercase(), k))
        .collect();

    for record in table.values_mut() {
        let Some(reference) = record
            .evidence
            .best_orthologue()
            .and_then(|id| annotations.get(id))
        else {
            continue;
        };
        let text = format!("{} {}", reference.symbol, reference.description).to_lowercase();
        let mut hits: Vec<String> = Vec::new();
        for (needle, keyword) in &lowered {
            if text.contains(needle.as_str()) && !hits.contains(keyword) {
                hits.push((*keyword).clone());
            }
        }
        let raw = hits.len() as f64 * hit_weight;
        record.evidence.keyword_hits = hits;
        record.scores.set(EvidenceLayer::Keyword, raw, cap);
    }
}
