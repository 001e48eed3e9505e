//! Error types for flowsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use flowsync_core::CoreError;

use crate::remote::RemoteError;

/// All errors that can arise from pull, push, and workspace locking.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from entity-map, metadata, or config handling.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A remote platform call failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (hash store).
    #[error("hash store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another process holds the lock for this operation.
    #[error("another '{operation}' is already running in this workspace; retry later")]
    Busy { operation: String },

    /// A skill or flow cannot be processed as laid out on disk.
    #[error("{path}: {reason}")]
    Structural { path: String, reason: String },

    /// The run was cancelled before or while this item was processed.
    #[error("operation cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Join(String),

    /// Per-item failures collected over a whole run.
    #[error("{} item(s) failed:\n{}", .0.len(), join_errors(.0))]
    Batch(Vec<SyncError>),
}

impl SyncError {
    /// `true` for lock contention, so callers can print a clean retry hint.
    pub fn is_busy(&self) -> bool {
        matches!(self, SyncError::Busy { .. })
    }

    pub(crate) fn structural(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::Structural {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Fold collected failures into a single error, `Ok` when there are none.
    /// Nested batches are flattened.
    pub fn from_failures(failures: Vec<SyncError>) -> Result<(), SyncError> {
        let mut flat = Vec::with_capacity(failures.len());
        for failure in failures {
            match failure {
                SyncError::Batch(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Ok(()),
            1 => Err(flat.remove(0)),
            _ => Err(SyncError::Batch(flat)),
        }
    }
}

fn join_errors(errors: &[SyncError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
