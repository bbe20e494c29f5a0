//! Policy loading and validation errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or validating a policy file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid cluster section: {0}")]
    Cluster(String),

    #[error("invalid provision section: {0}")]
    Provision(String),

    #[error("invalid task {task}: {reason}")]
    Task { task: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
