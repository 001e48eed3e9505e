//! Error types for flowsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from entity-map, metadata, and config handling.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (write/save path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A persisted document failed to parse — includes file path and the
    /// parser's own line context.
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// `dirs::config_dir()` returned `None` and no workspace config exists.
    #[error("cannot determine user config directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No `flowsync.yaml` was found in the workspace or user config dir.
    #[error("config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// The requested customer is not declared in the config.
    #[error("customer '{customer}' is not configured")]
    UnknownCustomer { customer: String },
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
