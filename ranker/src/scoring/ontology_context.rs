use std::collections::BTreeMap;

use crate::models::{EvidenceLayer, EvidenceTable, OntologyContext};

const DISPLAY_TERMS: usize = 5;

pub fn score_context(
    table: &mut EvidenceTable,
    context: &BTreeMap<String, OntologyContext>,
    hit_weight: f64,
    cap: f64,
) {
    for record in table.values_mut() {
        let Some(entry) = record
            .evidence
            .best_orthologue()
            .and_then(|id| context.get(id))
        else {
            continue;
        };
        let raw = entry.hits.len() as f64 * hit_weight;
        record.evidence.context = OntologyContext {
            terms: entry.terms.iter().take(DISPLAY_TERMS).cloned().collect(),
            hits: entry.hits.clone(),
        };
        record.scores.set(EvidenceLayer::Context, raw, cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrthologyClass, OrthologyRecord};
    use crate::scoring::init_table;

    #[test]
    fn scores_best_orthologue_context() {
        let mut table = init_table(&["g1".into(), "g2".into()]);
        table.get_mut("g1").unwrap().evidence.orthology = Some(OrthologyRecord {
            orthologues: vec!["AT1G01010".into(), "AT2G02020".into()],
            scores: vec![1.0, 0.5],
            best_score: 1.0,
            class: OrthologyClass::OneToOne,
        });
        let context = BTreeMap::from([(
            "AT1G01010".to_string(),
            OntologyContext {
                terms: (0..8).map(|i| format!("term {i}")).collect(),
                hits: vec!["senescent leaf".into(), "necrosis".into(), "dying tissue".into()],
            },
        )]);

        score_context(&mut table, &context, 1.0, 2.0);

        let g1 = &table["g1"];
        assert_eq!(g1.evidence.context.terms.len(), 5);
        assert_eq!(g1.scores.get(EvidenceLayer::Context).raw, 3.0);
        assert_eq!(g1.scores.get(EvidenceLayer::Context).capped, 2.0);
        assert_eq!(table["g2"].scores.get(EvidenceLayer::Context).raw, 0.0);
    }
}
