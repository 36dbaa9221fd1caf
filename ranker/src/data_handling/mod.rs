pub mod domtbl;
pub mod go_annotations;
pub mod orthology;
pub mod plant_ontology;
pub mod reference_annotation;

use anyhow::Result;
use tracing::info;

/// An evidence source that can be loaded from disk into typed records.
pub trait Dataset {
    type Output;

    fn load(&self) -> Result<Self::Output>;
}

/// Row-level bookkeeping for one parsed table. Dropped rows are counted, never errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_unmapped: usize,
    pub rows_malformed: usize,
    pub rows_filtered: usize,
}

impl ParseStats {
    pub fn log(&self, source: &str) {
        info!(
            "{}: read {} rows, kept {} (unmapped {}, malformed {}, filtered {})",
            source,
            self.rows_read,
            self.rows_kept,
            self.rows_unmapped,
            self.rows_malformed,
            self.rows_filtered
        );
    }
}
