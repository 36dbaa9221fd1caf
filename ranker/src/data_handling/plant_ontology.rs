use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use regex::Regex;
use tracing::info;

use crate::data_handling::{Dataset, ParseStats};
use crate::helper_functions::{first_present_column, read_tsv, string_column};
use crate::models::OntologyContext;

/// Orthologue → ontology term table (Plant Ontology style associations).
pub struct OntologyAnnotationTable<'a> {
    pub path: PathBuf,
    pub locus_regex: &'a Regex,
    /// Lower-cased context keywords.
    pub keywords: Vec<String>,
}

impl<'a> OntologyAnnotationTable<'a> {
    pub fn new(path: PathBuf, locus_regex: &'a Regex, keywords: &[String]) -> Self {
        Self {
            path,
            locus_regex,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn parse(&self) -> Result<(BTreeMap<String, OntologyContext>, ParseStats)> {
        info!("Reading ontology context from {}", self.path.display());
        let df = read_tsv(&self.path)?;
        let locus_col = first_present_column(&df, &["locus_name", "gene_id"]).ok_or_else(|| {
            anyhow!("{} has neither `locus_name` nor `gene_id`", self.path.display())
        })?;
        let term_col = first_present_column(&df, &["term_name", "po_term"]).ok_or_else(|| {
            anyhow!("{} has neither `term_name` nor `po_term`", self.path.display())
        })?;
        let loci = string_column(&df, locus_col)?;
        let terms = string_column(&df, term_col)?;

        let mut stats = ParseStats {
            rows_read: df.height(),
            ..ParseStats::default()
        };
        let mut context: BTreeMap<String, OntologyContext> = BTreeMap::new();

        for (raw, term) in loci.iter().zip(terms) {
            let Some(locus) = self.locus_regex.find(raw) else {
                stats.rows_unmapped += 1;
                continue;
            };
            let entry = context.entry(locus.as_str().to_string()).or_default();
            let lowered = term.to_lowercase();
            if self.keywords.iter().any(|k| lowered.contains(k.as_str())) {
                entry.hits.push(term.clone());
            }
            entry.terms.push(term);
            stats.rows_kept += 1;
        }
        Ok((context, stats))
    }
}

impl Dataset for OntologyAnnotationTable<'_> {
    type Output = BTreeMap<String, OntologyContext>;

    fn load(&self) -> Result<Self::Output> {
        let (context, stats) = self.parse()?;
        stats.log("Ontology context");
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn counts_each_matching_term_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("po.tsv");
        fs::write(
            &path,
            "gene_id\tpo_term\n\
             AT1G01010\tsenescent leaf with cell death\n\
             AT1G01010\troot\n\
             at1g01010\tleaf\n\
             AT2G02020\tNecrosis zone\n",
        )
        .unwrap();

        let re = Regex::new(r"AT[1-5MC]G\d{5}").unwrap();
        let keywords = vec!["senescent".to_string(), "cell death".to_string(), "NECROSIS".to_string()];
        let table = OntologyAnnotationTable::new(path, &re, &keywords);
        let (context, stats) = table.parse().unwrap();

        assert_eq!(context["AT1G01010"].terms.len(), 2);
        assert_eq!(context["AT1G01010"].hits, vec!["senescent leaf with cell death"]);
        assert_eq!(context["AT2G02020"].hits.len(), 1);
        assert_eq!(stats.rows_unmapped, 1);
    }

    #[test]
    fn missing_columns_are_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("po.tsv");
        fs::write(&path, "locus\tterm\nAT1G01010\tleaf\n").unwrap();
        let re = Regex::new(r"AT[1-5MC]G\d{5}").unwrap();
        assert!(OntologyAnnotationTable::new(path, &re, &[]).load().is_err());
    }
}
