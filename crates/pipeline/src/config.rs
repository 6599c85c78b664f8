//! Per-run configuration.

use serde::{Deserialize, Serialize};

use crate::{FilePath, ModelId, PipelineError};

/// Default number of proposal attempts in the review loop.
pub const DEFAULT_MAX_REVIEW_CYCLES: u32 = 3;

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Settings that shape one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Upper bound on proposal attempts (the first proposal counts).
    pub max_review_cycles: u32,
    /// Model used by every role.
    pub model: ModelId,
    /// Explicit target files; bypasses file identification when non-empty.
    pub target_files: Vec<FilePath>,
    /// Append token totals to the report.
    pub show_token_summary: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_review_cycles: DEFAULT_MAX_REVIEW_CYCLES,
            model: ModelId(DEFAULT_MODEL.to_string()),
            target_files: Vec::new(),
            show_token_summary: false,
        }
    }
}

impl RunConfig {
    /// Rejects settings a run cannot start with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_review_cycles == 0 {
            return Err(PipelineError::Configuration {
                message: "max_review_cycles must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Parses a comma-separated path list, dropping blanks and duplicates.
    pub fn parse_target_files(raw: &str) -> Vec<FilePath> {
        let mut paths: Vec<FilePath> = Vec::new();
        for path in raw.split(',').filter_map(FilePath::new) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_cycles_is_rejected() {
        let config = RunConfig {
            max_review_cycles: 0,
            ..RunConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Configuration { .. })));
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn target_files_are_split_and_trimmed() {
        let paths = RunConfig::parse_target_files(" src/a.py, ,src/b.py,src/a.py ");
        let raw: Vec<_> = paths.iter().map(FilePath::as_str).collect();
        assert_eq!(raw, ["src/a.py", "src/b.py"]);
    }
}
