use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::info;

use crate::data_handling::{Dataset, ParseStats};
use crate::models::ReferenceAnnotation;

/// Attribute keys tried in order for the free-text description.
const DESCRIPTION_KEYS: [&str; 4] = [
    "curator_summary",
    "full_name",
    "computational_description",
    "Note",
];

/// Reference-species GFF3; only `gene` features are read.
pub struct ReferenceGff3<'a> {
    pub path: PathBuf,
    pub locus_regex: &'a Regex,
}

fn parse_attributes(column: &str) -> HashMap<&str, &str> {
    column
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl ReferenceGff3<'_> {
    pub fn parse(&self) -> Result<(BTreeMap<String, ReferenceAnnotation>, ParseStats)> {
        info!("Reading reference annotation from {}", self.path.display());
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open GFF3 {}", self.path.display()))?;
        let mut stats = ParseStats::default();
        let mut annotations = BTreeMap::new();

        for line in BufReader::new(file).lines() {
            let line =
                line.with_context(|| format!("failed to read GFF3 {}", self.path.display()))?;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            stats.rows_read += 1;

            let fields: Vec<&str> = line.trim_end().split('\t').collect();
            if fields.len() < 9 {
                stats.rows_malformed += 1;
                continue;
            }
            if fields[2] != "gene" {
                stats.rows_filtered += 1;
                continue;
            }
            let attributes = fields[8];
            let Some(locus) = self.locus_regex.find(attributes) else {
                stats.rows_unmapped += 1;
                continue;
            };

            let attrs = parse_attributes(attributes);
            let symbol = attrs.get("symbol").map(|s| decode(s)).unwrap_or_default();
            let description = DESCRIPTION_KEYS
                .iter()
                .find_map(|key| attrs.get(key))
                .map(|s| decode(s))
                .unwrap_or_default();

            annotations.insert(
                locus.as_str().to_string(),
                ReferenceAnnotation { symbol, description },
            );
        }
        stats.rows_kept = annotations.len();
        Ok((annotations, stats))
    }
}

impl Dataset for ReferenceGff3<'_> {
    type Output = BTreeMap<String, ReferenceAnnotation>;

    fn load(&self) -> Result<Self::Output> {
        let (annotations, stats) = self.parse()?;
        stats.log("Reference GFF3");
        Ok(annotations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn reads_gene_features_with_description_priority() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ref.gff3");
        fs::write(
            &path,
            "##gff-version 3\n\
             Chr1\tAraport11\tgene\t1\t100\t.\t+\t.\tID=AT1G01010;symbol=MC1;full_name=metacaspase 1;Note=ignored\n\
             Chr1\tAraport11\tmRNA\t1\t100\t.\t+\t.\tID=AT1G01010.1\n\
             Chr2\tAraport11\tgene\t1\t100\t.\t+\t.\tID=AT2G02020;curator_summary=Involved in cell%20death%2C HR;full_name=x\n\
             Chr3\tAraport11\tgene\t1\t100\t.\t+\t.\tID=AT3G03030;Note=bad %ZZ escape\n\
             Chr4\tAraport11\tgene\t1\t100\n",
        )
        .unwrap();

        let re = Regex::new(r"AT[1-5MC]G\d{5}").unwrap();
        let (annotations, stats) = ReferenceGff3 { path, locus_regex: &re }.parse().unwrap();

        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations["AT1G01010"].symbol, "MC1");
        assert_eq!(annotations["AT1G01010"].description, "metacaspase 1");
        assert_eq!(annotations["AT2G02020"].description, "Involved in cell death, HR");
        assert_eq!(annotations["AT2G02020"].symbol, "");
        assert_eq!(annotations["AT3G03030"].description, "bad %ZZ escape");
        assert_eq!(stats.rows_filtered, 1);
        assert_eq!(stats.rows_malformed, 1);
    }
}
