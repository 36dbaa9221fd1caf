use std::collections::BTreeMap;

use crate::models::{EvidenceLayer, EvidenceTable, GoAnnotation};

/// GO membership score: each distinct matched term adds its weight in every category
/// that lists it. A gene belongs to every category with at least one matched term.
pub fn score_go(
    table: &mut EvidenceTable,
    annotations: &[GoAnnotation],
    weights: &BTreeMap<String, BTreeMap<String, f64>>,
    cap: f64,
) {
    for annotation in annotations {
        if let Some(record) = table.get_mut(&annotation.gene) {
            record.evidence.go.terms.insert(annotation.term.clone());
        }
    }

    for record in table.values_mut() {
        let go = &mut record.evidence.go;
        let mut raw = 0.0;
        let mut categories = Vec::new();
        for (category, term_weights) in weights {
            let mut member = false;
            for term in &go.terms {
                if let Some(w) = term_weights.get(term) {
                    raw += w;
                    member = true;
                }
            }
            if member {
                categories.push(category.clone());
            }
        }
        go.categories = categories;
        record.scores.set(EvidenceLayer::Go, raw, cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::init_table;

    fn annotation(gene: &str, term: &str) -> GoAnnotation {
        GoAnnotation { gene: gene.into(), term: term.into() }
    }

    #[test]
    fn sums_weights_across_categories_once_per_term() {
        let weights = BTreeMap::from([
            ("PCD".to_string(), BTreeMap::from([("GO:1".to_string(), 3.0)])),
            (
                "ROS".to_string(),
                BTreeMap::from([("GO:1".to_string(), 1.0), ("GO:2".to_string(), 2.0)]),
            ),
        ]);
        let mut table = init_table(&["g1".into(), "g2".into()]);
        let annotations = vec![
            annotation("g1", "GO:1"),
            annotation("g1", "GO:1"),
            annotation("g2", "GO:2"),
            annotation("g2", "GO:2"),
        ];

        score_go(&mut table, &annotations, &weights, 3.5);

        let g1 = &table["g1"];
        assert_eq!(g1.scores.get(EvidenceLayer::Go).raw, 4.0);
        assert_eq!(g1.scores.get(EvidenceLayer::Go).capped, 3.5);
        assert_eq!(g1.evidence.go.categories, vec!["PCD", "ROS"]);
        let g2 = &table["g2"];
        assert_eq!(g2.scores.get(EvidenceLayer::Go).raw, 2.0);
        assert_eq!(g2.evidence.go.category_label(), "ROS");
    }
}
