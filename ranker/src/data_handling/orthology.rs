use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::info;

use crate::config::ClassificationThresholds;
use crate::data_handling::{Dataset, ParseStats};
use crate::helper_functions::{read_tsv, string_column};
use crate::id_mapping::IdMapper;
use crate::models::{GeneId, OrthologyClass, OrthologyRecord};

/// InParanoid-style cluster table with `OrtoA` / `OrtoB` columns.
pub struct OrthologyTable<'a> {
    pub path: PathBuf,
    pub mapper: &'a IdMapper,
    pub query_regex: Option<&'a Regex>,
    pub orthologue_regex: &'a Regex,
    pub thresholds: &'a ClassificationThresholds,
}

/// Orthologue hits in `OrtoB`, each scored by the token that follows it.
pub fn parse_hits(text: &str, orthologue_regex: &Regex) -> Vec<(String, f64)> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens
        .iter()
        .enumerate()
        .filter_map(|(i, token)| {
            let id = orthologue_regex.find(token)?.as_str().to_string();
            let score = tokens
                .get(i + 1)
                .and_then(|next| next.parse::<f64>().ok())
                .unwrap_or(0.0);
            Some((id, score))
        })
        .collect()
}

pub fn classify(scores: &[f64], t: &ClassificationThresholds) -> Option<OrthologyClass> {
    let best = scores.iter().copied().reduce(f64::max)?;
    if best < t.min_best_score {
        return Some(OrthologyClass::LowConfidence);
    }
    if scores.len() == 1 {
        return Some(OrthologyClass::OneToOne);
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let within_limit = t.max_hits.map_or(true, |max| scores.len() <= max);
    if sorted[0] - sorted[1] >= t.min_second_best_gap && within_limit {
        Some(OrthologyClass::OneToOne)
    } else {
        Some(OrthologyClass::OneToMany)
    }
}

impl OrthologyTable<'_> {
    fn query_gene(&self, orto_a: &str) -> Option<GeneId> {
        let located = match self.query_regex {
            Some(re) => re.find(orto_a)?.as_str(),
            None => orto_a,
        };
        self.mapper.map(located)
    }

    pub fn parse(&self) -> Result<(BTreeMap<GeneId, OrthologyRecord>, ParseStats)> {
        info!("Reading orthology clusters from {}", self.path.display());
        let df = read_tsv(&self.path)?;
        let context = || format!("orthology table {}", self.path.display());
        let side_a = string_column(&df, "OrtoA").with_context(context)?;
        let side_b = string_column(&df, "OrtoB").with_context(context)?;

        let mut stats = ParseStats {
            rows_read: df.height(),
            ..ParseStats::default()
        };
        let mut records = BTreeMap::new();

        for (a, b) in side_a.iter().zip(side_b.iter()) {
            let Some(gene) = self.query_gene(a) else {
                stats.rows_unmapped += 1;
                continue;
            };
            let hits = parse_hits(b, self.orthologue_regex);
            let scores: Vec<f64> = hits.iter().map(|(_, s)| *s).collect();
            let Some(class) = classify(&scores, self.thresholds) else {
                stats.rows_filtered += 1;
                continue;
            };
            let best_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            // last row wins for a repeated gene
            records.insert(
                gene,
                OrthologyRecord {
                    orthologues: hits.into_iter().map(|(id, _)| id).collect(),
                    scores,
                    best_score,
                    class,
                },
            );
        }
        stats.rows_kept = records.len();
        Ok((records, stats))
    }
}

impl Dataset for OrthologyTable<'_> {
    type Output = BTreeMap<GeneId, OrthologyRecord>;

    fn load(&self) -> Result<Self::Output> {
        let (records, stats) = self.parse()?;
        stats.log("Orthology");
        Ok(records)
    }
}
