use std::collections::BTreeMap;

use crate::config::OrthologyWeights;
use crate::models::{EvidenceLayer, EvidenceTable, GeneId, OrthologyClass, OrthologyRecord};

pub fn orthology_points(record: &OrthologyRecord, weights: &OrthologyWeights) -> f64 {
    if record.best_score < weights.min_best_score_for_points {
        return 0.0;
    }
    let mut points = record.best_score * weights.best_hit_multiplier;
    if record.class == OrthologyClass::OneToOne {
        points += weights.one_to_one_bonus;
    }
    points
}

pub fn score_orthology(
    table: &mut EvidenceTable,
    records: BTreeMap<GeneId, OrthologyRecord>,
    weights: &OrthologyWeights,
    cap: f64,
) {
    for (gene, record) in records {
        let Some(entry) = table.get_mut(&gene) else {
            continue;
        };
        let raw = orthology_points(&record, weights);
        entry.scores.set(EvidenceLayer::Orthology, raw, cap);
        entry.evidence.orthology = Some(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::init_table;
    use approx::assert_abs_diff_eq;

    fn record(scores: Vec<f64>, class: OrthologyClass) -> OrthologyRecord {
        OrthologyRecord {
            orthologues: (0..scores.len()).map(|i| format!("AT1G0{i}010")).collect(),
            best_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            scores,
            class,
        }
    }

    #[test]
    fn points_follow_best_score_and_class() {
        let w = OrthologyWeights::default();
        assert_abs_diff_eq!(
            orthology_points(&record(vec![0.9], OrthologyClass::OneToOne), &w),
            3.7,
            epsilon = 1e-9
        );
        assert_abs_diff_eq!(
            orthology_points(&record(vec![1.0, 0.95], OrthologyClass::OneToMany), &w),
            3.0,
            epsilon = 1e-9
        );
        assert_eq!(orthology_points(&record(vec![0.4], OrthologyClass::LowConfidence), &w), 0.0);
    }

    #[test]
    fn only_base_genes_are_scored() {
        let mut table = init_table(&["g1".into()]);
        let records = BTreeMap::from([
            ("g1".to_string(), record(vec![1.0], OrthologyClass::OneToOne)),
            ("other".to_string(), record(vec![1.0], OrthologyClass::OneToOne)),
        ]);
        score_orthology(&mut table, records, &OrthologyWeights::default(), 3.5);

        assert_eq!(table.len(), 1);
        let g1 = &table["g1"];
        assert_eq!(g1.scores.get(EvidenceLayer::Orthology).raw, 4.0);
        assert_eq!(g1.scores.get(EvidenceLayer::Orthology).capped, 3.5);
        assert_eq!(g1.evidence.best_orthologue(), Some("AT1G00010"));
        assert_eq!(g1.evidence.orthology_class(), "one_to_one");
    }
}
