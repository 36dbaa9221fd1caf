//! Reader for HMMER `--domtblout` tables.
//!
//! The format is whitespace separated with a free-text description as the trailing
//! column, so it is read line by line rather than through the tabular reader.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::data_handling::{Dataset, ParseStats};
use crate::id_mapping::IdMapper;
use crate::models::DomainHit;

const MIN_FIELDS: usize = 23;

const TARGET_NAME: usize = 0;
const ACCESSION: usize = 1;
const QUERY_NAME: usize = 3;
const DOMAIN_I_EVALUE: usize = 12;

pub struct DomainTable<'a> {
    pub path: PathBuf,
    pub mapper: &'a IdMapper,
    pub evalue_threshold: f64,
}

/// `PF00656.26` → `PF00656`.
fn strip_version(accession: &str) -> &str {
    accession.split('.').next().unwrap_or(accession)
}

impl DomainTable<'_> {
    pub fn parse(&self) -> Result<(Vec<DomainHit>, ParseStats)> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open domain table {}", self.path.display()))?;
        let mut stats = ParseStats::default();
        let mut hits = Vec::new();

        for line in BufReader::new(file).lines() {
            let line = line
                .with_context(|| format!("failed to read domain table {}", self.path.display()))?;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            stats.rows_read += 1;

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < MIN_FIELDS {
                stats.rows_malformed += 1;
                continue;
            }
            let Ok(evalue) = fields[DOMAIN_I_EVALUE].parse::<f64>() else {
                stats.rows_malformed += 1;
                continue;
            };
            if evalue > self.evalue_threshold {
                stats.rows_filtered += 1;
                continue;
            }
            let Some(gene) = self.mapper.map(fields[QUERY_NAME]) else {
                stats.rows_unmapped += 1;
                continue;
            };

            let name = fields[TARGET_NAME].to_string();
            let accession = fields[ACCESSION];
            let pfam_id = if accession == "-" {
                name.clone()
            } else {
                strip_version(accession).to_string()
            };
            hits.push(DomainHit {
                gene,
                pfam_id,
                name,
                evalue,
            });
        }
        stats.rows_kept = hits.len();
        Ok((hits, stats))
    }
}

impl Dataset for DomainTable<'_> {
    type Output = Vec<DomainHit>;

    fn load(&self) -> Result<Vec<DomainHit>> {
        let (hits, stats) = self.parse()?;
        stats.log("Domain table");
        Ok(hits)
    }
}
