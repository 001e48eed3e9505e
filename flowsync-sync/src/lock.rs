//! Cross-process advisory lock, one file per operation name.
//!
//! Holding the lock means `<root>/.flowsync/locks/<operation>.lock` exists.
//! The file is created with `create_new`, so a second process trying the
//! same operation fails fast with [`SyncError::Busy`]. A lock file whose
//! mtime is older than [`STALE_AFTER`] is treated as abandoned: it is
//! removed and acquisition is retried exactly once.
//!
//! The operations in [`SYNC_OPERATIONS`] all write the same map, ledger and
//! tree, so they also exclude each other: after creating its own file, a
//! sync operation backs off with `Busy` if any other sync lock is fresh.
//! Two racing acquirers may both back off; neither proceeds alongside the
//! other.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use flowsync_core::paths;

use crate::error::{io_err, SyncError};

pub const STALE_AFTER: Duration = Duration::from_secs(15 * 60);

/// Operations that mutate the workspace state and never run concurrently.
pub const SYNC_OPERATIONS: [&str; 3] = ["pull", "push", "merge"];

/// Guard for a held operation lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
    operation: String,
}

impl WorkspaceLock {
    /// Acquire the lock for `operation` in the workspace at `root`.
    pub fn acquire(root: &Path, operation: &str) -> Result<Self, SyncError> {
        let dir = paths::lock_dir(root);
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let path = dir.join(format!("{operation}.lock"));

        match try_create(&path)? {
            true => {}
            false if is_stale(&path)? => {
                tracing::warn!(lock = %path.display(), "reclaiming stale lock");
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(io_err(&path, e)),
                }
                if !try_create(&path)? {
                    return Err(busy(operation));
                }
            }
            false => return Err(busy(operation)),
        }

        if let Some(other) = conflicting_lock(&dir, operation)? {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(lock = %path.display(), "failed to back off lock: {e}");
            }
            return Err(busy(other));
        }

        tracing::debug!(lock = %path.display(), "lock acquired");
        Ok(Self {
            path,
            operation: operation.to_string(),
        })
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), "failed to release lock: {e}");
        }
    }
}

/// `Ok(false)` when the file already exists.
fn try_create(path: &Path) -> Result<bool, SyncError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(io_err(path, e)),
    }
}

/// A fresh lock of another sync operation, if `operation` is one of them.
/// Stale foreign locks are left for their own operation to reclaim.
fn conflicting_lock(dir: &Path, operation: &str) -> Result<Option<&'static str>, SyncError> {
    if !SYNC_OPERATIONS.contains(&operation) {
        return Ok(None);
    }
    for other in SYNC_OPERATIONS.into_iter().filter(|o| *o != operation) {
        let path = dir.join(format!("{other}.lock"));
        if !is_stale(&path)? {
            return Ok(Some(other));
        }
    }
    Ok(None)
}

fn is_stale(path: &Path) -> Result<bool, SyncError> {
    let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        // Released between our attempt and this check.
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(io_err(path, e)),
    };
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    Ok(age > STALE_AFTER)
}

fn busy(operation: &str) -> SyncError {
    SyncError::Busy {
        operation: operation.to_string(),
    }
}
