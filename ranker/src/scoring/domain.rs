use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::models::{DomainHit, EvidenceLayer, EvidenceTable, GoEvidence};

/// `1.2e-30`, `1.0e-05`: one decimal and at least two exponent digits.
fn scientific(value: f64) -> String {
    let text = format!("{value:.1e}");
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

/// Expected domain ids for a gene, chosen by its GO category membership.
///
/// One category uses that category's list (empty when none is configured); no category
/// or several categories use the union of every configured list.
pub fn expected_for<'a>(
    go: &GoEvidence,
    expected: &'a BTreeMap<String, Vec<String>>,
) -> BTreeSet<&'a str> {
    match go.categories.as_slice() {
        [single] => expected
            .get(single)
            .map(|ids| ids.iter().map(String::as_str).collect())
            .unwrap_or_default(),
        _ => expected.values().flatten().map(String::as_str).collect(),
    }
}

pub fn score_domains(
    table: &mut EvidenceTable,
    hits: &[DomainHit],
    expected: &BTreeMap<String, Vec<String>>,
    hit_weight: f64,
    cap: f64,
) {
    let mut by_gene: BTreeMap<&str, Vec<&DomainHit>> = BTreeMap::new();
    for hit in hits {
        by_gene.entry(hit.gene.as_str()).or_default().push(hit);
    }

    for (gene, record) in table.iter_mut() {
        let allowed = expected_for(&record.evidence.go, expected);
        let evidence = &mut record.evidence.domain;
        for hit in by_gene.get(gene.as_str()).into_iter().flatten() {
            if allowed.contains(hit.pfam_id.as_str()) {
                evidence.matched_ids.insert(hit.pfam_id.clone());
                evidence
                    .matched
                    .push(format!("{}({},E={})", hit.pfam_id, hit.name, scientific(hit.evalue)));
            }
        }
        evidence.matched.sort();
        if !evidence.matched.is_empty() {
            debug!("{}: {}", gene, evidence.matched.join(", "));
        }
        let raw = evidence.matched_ids.len() as f64 * hit_weight;
        record.scores.set(EvidenceLayer::Domain, raw, cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::init_table;

    fn hit(gene: &str, pfam: &str, evalue: f64) -> DomainHit {
        DomainHit {
            gene: gene.into(),
            pfam_id: pfam.into(),
            name: format!("{pfam}_name"),
            evalue,
        }
    }

    fn expected() -> BTreeMap<String, Vec<String>> {
        [
            ("PCD".to_string(), vec!["PF1".to_string(), "PF2".to_string()]),
            ("ROS".to_string(), vec!["PF3".to_string()]),
        ]
        .into()
    }

    #[test]
    fn category_selects_expected_list() {
        let exp = expected();
        let mut go = GoEvidence::default();
        assert_eq!(expected_for(&go, &exp).len(), 3);
        go.categories = vec!["ROS".into()];
        assert_eq!(expected_for(&go, &exp), BTreeSet::from(["PF3"]));
        go.categories = vec!["OTHER".into()];
        assert!(expected_for(&go, &exp).is_empty());
        go.categories = vec!["PCD".into(), "ROS".into()];
        assert_eq!(expected_for(&go, &exp).len(), 3);
    }

    #[test]
    fn counts_distinct_matched_domains() {
        let mut table = init_table(&["g1".into(), "g2".into()]);
        table.get_mut("g1").unwrap().evidence.go.categories = vec!["PCD".into()];
        table.get_mut("g2").unwrap().evidence.go.categories = vec!["ROS".into()];
        let hits = vec![
            hit("g1", "PF1", 1.2e-30),
            hit("g1", "PF1", 3e-10),
            hit("g1", "PF2", 1e-8),
            hit("g1", "PF3", 1e-8),
            hit("g2", "PF1", 1e-8),
            hit("elsewhere", "PF3", 1e-8),
        ];

        score_domains(&mut table, &hits, &expected(), 2.0, 3.0);

        let g1 = &table["g1"];
        assert_eq!(g1.scores.get(EvidenceLayer::Domain).raw, 4.0);
        assert_eq!(g1.scores.get(EvidenceLayer::Domain).capped, 3.0);
        assert_eq!(g1.evidence.domain.matched.len(), 3);
        assert!(g1.evidence.domain.matched.contains(&"PF1(PF1_name,E=1.2e-30)".to_string()));
        assert_eq!(table["g2"].scores.get(EvidenceLayer::Domain).raw, 0.0);
    }

    #[test]
    fn evalues_use_two_exponent_digits() {
        assert_eq!(scientific(1e-5), "1.0e-05");
        assert_eq!(scientific(1.23e-30), "1.2e-30");
        assert_eq!(scientific(2.0), "2.0e+00");
        assert_eq!(scientific(1.5e120), "1.5e+120");
    }
}
