use anyhow::{ensure, Context, Result};
use regex::Regex;

use crate::models::GeneId;

/// Translates raw protein/locus ids into canonical gene ids.
///
/// The regex must carry exactly one capture group; the canonical id is the captured
/// text followed by the configured suffix. The same mapper is used for every table so
/// that joins between layers line up.
#[derive(Debug, Clone)]
pub struct IdMapper {
    pattern: Regex,
    suffix: String,
}

impl IdMapper {
    pub fn new(pattern: &str, suffix: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("invalid id mapping regex `{pattern}`"))?;
        // captures_len() includes the implicit whole-match group
        let groups = pattern.captures_len() - 1;
        ensure!(
            groups == 1,
            "id mapping regex `{}` must contain exactly one capture group, found {}",
            pattern.as_str(),
            groups
        );
        Ok(Self {
            pattern,
            suffix: suffix.to_string(),
        })
    }

    pub fn map(&self, raw: &str) -> Option<GeneId> {
        let core = self.pattern.captures(raw)?.get(1)?;
        Some(format!("{}{}", core.as_str(), self.suffix))
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}
