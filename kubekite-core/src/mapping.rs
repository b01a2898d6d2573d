//! Job template mapping
//!
//! A mapping file is a YAML list pairing a Kubernetes job template with the
//! filter tags that route Buildkite jobs to it:
//!
//! ```yaml
//! - template: job-linux.yaml
//!   filters: ["os=linux"]
//! - template: job-windows.yaml
//!   filters: ["os=windows"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading a mapping file
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read job mapping {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse job mapping: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("job mapping contains no templates")]
    Empty,
}

/// One entry of the mapping file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMapping {
    /// Path to the job template YAML
    pub template: PathBuf,
    /// Tags a job should carry to be routed to this template
    #[serde(default)]
    pub filters: Vec<String>,
}

impl JobMapping {
    /// A mapping for a lone template with no filters
    pub fn single(template: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            filters: Vec::new(),
        }
    }
}

/// Parses mapping YAML. An empty list is rejected.
pub fn parse_mappings(yaml: &str) -> Result<Vec<JobMapping>, MappingError> {
    if yaml.trim().is_empty() {
        return Err(MappingError::Empty);
    }

    let mappings: Option<Vec<JobMapping>> = serde_yaml::from_str(yaml)?;
    match mappings {
        Some(mappings) if !mappings.is_empty() => Ok(mappings),
        _ => Err(MappingError::Empty),
    }
}

/// Reads and parses a mapping file
pub fn load_mappings(path: &Path) -> Result<Vec<JobMapping>, MappingError> {
    let yaml = std::fs::read_to_string(path).map_err(|source| MappingError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_mappings(&yaml)
}
