pub mod hmmscan;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Result};

use crate::models::GeneId;

/// Produces a `--domtblout` style table covering (at least) the given genes.
pub trait DomainSearch {
    fn domain_table(&self, genes: &BTreeSet<GeneId>, work_dir: &Path) -> Result<PathBuf>;
}

/// A domain table computed ahead of time; nothing is run.
pub struct PrecomputedDomainTable {
    pub path: PathBuf,
}

impl DomainSearch for PrecomputedDomainTable {
    fn domain_table(&self, _genes: &BTreeSet<GeneId>, _work_dir: &Path) -> Result<PathBuf> {
        ensure!(
            self.path.is_file(),
            "precomputed domain table not found: {}",
            self.path.display()
        );
        Ok(self.path.clone())
    }
}
