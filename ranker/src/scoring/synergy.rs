//! Bonus points when independent evidence lines agree.

use serde::Deserialize;
use tracing::debug;

use crate::models::{EvidenceLayer, EvidenceTable, GeneEvidence, OrthologyClass};

/// A rule condition, typed once when the configuration is read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum SynergyCondition {
    /// `has_<CATEGORY>_GO`
    HasGoCategory(String),
    HasExpectedDomain,
    /// `tair_keyword_hits>=N` or `keyword_hits>=N`
    KeywordHitsAtLeast(usize),
    HasOneToOneOrthologue,
    /// Anything else. Never satisfied.
    Unrecognised(String),
}

impl From<String> for SynergyCondition {
    fn from(text: String) -> Self {
        let trimmed = text.trim();
        if trimmed == "has_expected_domain" {
            return SynergyCondition::HasExpectedDomain;
        }
        if trimmed == "has_one_to_one_ortholog" {
            return SynergyCondition::HasOneToOneOrthologue;
        }
        let threshold = trimmed
            .strip_prefix("tair_keyword_hits>=")
            .or_else(|| trimmed.strip_prefix("keyword_hits>="));
        if let Some(n) = threshold {
            return match n.trim().parse() {
                Ok(n) => SynergyCondition::KeywordHitsAtLeast(n),
                Err(_) => SynergyCondition::Unrecognised(text),
            };
        }
        if let Some(category) = trimmed
            .strip_prefix("has_")
            .and_then(|rest| rest.strip_suffix("_GO"))
            .filter(|c| !c.is_empty())
        {
            return SynergyCondition::HasGoCategory(category.to_string());
        }
        SynergyCondition::Unrecognised(text)
    }
}

impl SynergyCondition {
    pub fn holds(&self, evidence: &GeneEvidence) -> bool {
        match self {
            SynergyCondition::HasGoCategory(category) => evidence.go.has_category(category),
            SynergyCondition::HasExpectedDomain => !evidence.domain.matched_ids.is_empty(),
            SynergyCondition::KeywordHitsAtLeast(n) => evidence.keyword_hits.len() >= *n,
            SynergyCondition::HasOneToOneOrthologue => evidence
                .orthology
                .as_ref()
                .is_some_and(|o| o.class == OrthologyClass::OneToOne),
            SynergyCondition::Unrecognised(_) => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynergyRule {
    pub name: String,
    #[serde(default)]
    pub if_all: Vec<SynergyCondition>,
    #[serde(default)]
    pub bonus: f64,
}

impl SynergyRule {
    pub fn fires(&self, evidence: &GeneEvidence) -> bool {
        self.if_all.iter().all(|c| c.holds(evidence))
    }
}

pub fn score_synergy(table: &mut EvidenceTable, rules: &[SynergyRule], cap: f64) {
    for (gene, record) in table.iter_mut() {
        let mut raw = 0.0;
        let mut triggered = Vec::new();
        for rule in rules {
            if rule.fires(&record.evidence) {
                raw += rule.bonus;
                triggered.push(rule.name.clone());
            }
        }
        if !triggered.is_empty() {
            debug!("{}: synergy {}", gene, triggered.join(", "));
        }
        record.evidence.synergy.triggered = triggered;
        record.scores.set(EvidenceLayer::Synergy, raw, cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrthologyRecord;
    use crate::scoring::init_table;

    fn rule(name: &str, conditions: &[&str], bonus: f64) -> SynergyRule {
        SynergyRule {
            name: name.into(),
            if_all: conditions.iter().map(|c| SynergyCondition::from(c.to_string())).collect(),
            bonus,
        }
    }

    #[test]
    fn parses_conditions() {
        let parse = |s: &str| SynergyCondition::from(s.to_string());
        assert_eq!(parse("has_PCD_GO"), SynergyCondition::HasGoCategory("PCD".into()));
        assert_eq!(parse("tair_keyword_hits>=2"), SynergyCondition::KeywordHitsAtLeast(2));
        assert_eq!(parse("keyword_hits>=1"), SynergyCondition::KeywordHitsAtLeast(1));
        assert_eq!(parse("has_one_to_one_ortholog"), SynergyCondition::HasOneToOneOrthologue);
        assert_eq!(parse("has__GO"), SynergyCondition::Unrecognised("has__GO".into()));
        assert_eq!(
            parse("tair_keyword_hits>=many"),
            SynergyCondition::Unrecognised("tair_keyword_hits>=many".into())
        );
    }

    #[test]
    fn firing_rules_are_summed_and_capped() {
        let mut table = init_table(&["g1".into(), "g2".into()]);
        {
            let g1 = &mut table.get_mut("g1").unwrap().evidence;
            g1.go.categories = vec!["PCD".into()];
            g1.domain.matched_ids.insert("PF00656".into());
            g1.keyword_hits = vec!["cell death".into()];
            g1.orthology = Some(OrthologyRecord {
                orthologues: vec!["AT1G01010".into()],
                scores: vec![1.0],
                best_score: 1.0,
                class: OrthologyClass::OneToOne,
            });
        }
        let rules = vec![
            rule("pcd_domain", &["has_PCD_GO", "has_expected_domain"], 3.0),
            rule("ortho_kw", &["has_one_to_one_ortholog", "tair_keyword_hits>=1"], 2.0),
            rule("ros", &["has_ROS_GO"], 5.0),
            rule("typo", &["has_expected_domian"], 5.0),
            rule("always", &[], 2.0),
        ];

        score_synergy(&mut table, &rules, 6.0);

        let g1 = &table["g1"];
        assert_eq!(g1.evidence.synergy.triggered, vec!["pcd_domain", "ortho_kw", "always"]);
        assert_eq!(g1.scores.get(EvidenceLayer::Synergy).raw, 7.0);
        assert_eq!(g1.scores.get(EvidenceLayer::Synergy).capped, 6.0);
        assert_eq!(table["g2"].scores.get(EvidenceLayer::Synergy).raw, 2.0);
    }
}
