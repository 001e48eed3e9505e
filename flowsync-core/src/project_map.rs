//! Per-customer entity map persistence.
//!
//! # Storage layout
//!
//! ```text
//! <root>/.flowsync/
//!   <customer>/          (mode 0700, created on first save)
//!     map.json           (mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function takes the workspace root explicitly (`_at(root, …)`), so
//! tests run against a `TempDir` and never touch the real workspace.

use std::path::Path;

use crate::error::{io_err, CoreError};
use crate::paths::{customer_state_dir, map_path};
use crate::types::{CustomerIdn, ProjectMap};

/// Load the entity map for `customer`.
///
/// Returns an empty map if the file does not yet exist (first pull), and
/// `CoreError::Parse` (with path + line context) if it is malformed.
pub fn load_at(root: &Path, customer: &CustomerIdn) -> Result<ProjectMap, CoreError> {
    let path = map_path(root, customer);
    if !path.exists() {
        return Ok(ProjectMap::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_json::from_str(&contents).map_err(|e| CoreError::Parse {
        path,
        reason: e.to_string(),
    })
}

/// Atomically save the entity map for `customer`.
///
/// Write flow: serialize → `map.json.tmp` sibling → `chmod 0600` → `rename`.
/// The `.tmp` is always in the same directory as the target, so the rename
/// never crosses filesystems.
pub fn save_at(root: &Path, customer: &CustomerIdn, map: &ProjectMap) -> Result<(), CoreError> {
    let dir = customer_state_dir(root, customer);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = map_path(root, customer);
    let tmp = path.with_extension("json.tmp");

    let json = serde_json::to_string_pretty(map)?;
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
