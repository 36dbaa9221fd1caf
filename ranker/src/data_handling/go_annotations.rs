use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::data_handling::{Dataset, ParseStats};
use crate::helper_functions::{read_tsv, string_column};
use crate::id_mapping::IdMapper;
use crate::models::{GeneId, GoAnnotation};

/// Gene → GO term table (`gene`, `GO`, `level` columns).
pub struct GoAnnotationTable<'a> {
    pub path: PathBuf,
    pub mapper: &'a IdMapper,
    pub targets: &'a BTreeSet<String>,
    /// Upper-cased level to keep; `None` keeps every level.
    pub level: Option<String>,
}

impl GoAnnotationTable<'_> {
    pub fn parse(&self) -> Result<(Vec<GoAnnotation>, ParseStats)> {
        info!("Reading GO annotations from {}", self.path.display());
        let df = read_tsv(&self.path)?;
        let context = || format!("GO table {}", self.path.display());
        let genes = string_column(&df, "gene").with_context(context)?;
        let terms = string_column(&df, "GO").with_context(context)?;
        let levels = string_column(&df, "level").with_context(context)?;

        let mut stats = ParseStats {
            rows_read: df.height(),
            ..ParseStats::default()
        };
        let mut annotations = Vec::new();

        for ((raw, term), level) in genes.iter().zip(terms).zip(levels) {
            let Some(gene) = self.mapper.map(raw) else {
                stats.rows_unmapped += 1;
                continue;
            };
            if !self.targets.contains(&term) {
                stats.rows_filtered += 1;
                continue;
            }
            if let Some(wanted) = &self.level {
                if &level != wanted {
                    stats.rows_filtered += 1;
                    continue;
                }
            }
            annotations.push(GoAnnotation { gene, term });
        }
        stats.rows_kept = annotations.len();
        Ok((annotations, stats))
    }
}

impl Dataset for GoAnnotationTable<'_> {
    type Output = Vec<GoAnnotation>;

    fn load(&self) -> Result<Vec<GoAnnotation>> {
        let (annotations, stats) = self.parse()?;
        stats.log("GO annotations");
        Ok(annotations)
    }
}

/// Sorted, de-duplicated genes of the surviving annotations.
pub fn base_genes(annotations: &[GoAnnotation]) -> Vec<GeneId> {
    annotations
        .iter()
        .map(|a| a.gene.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
