//! Hash store — the change ledger.
//!
//! Maps workspace-relative, forward-slash paths to the SHA-256 hex digest of
//! the content both sides agreed on at the last successful sync. Absence of
//! a key means "never synchronized".
//!
//! Persisted as a flat, pretty-printed JSON object at
//! `<root>/.flowsync/<customer>/hashes.json`, written with the same atomic
//! `.tmp` + rename pattern as the entity map.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use flowsync_core::{paths, CustomerIdn};

use crate::error::{io_err, SyncError};

/// In-memory ledger: ledger key → SHA-256 hex digest.
pub type HashStore = BTreeMap<String, String>;

/// Path to the ledger JSON for `customer`, rooted at the workspace `root`.
pub fn store_path_at(root: &Path, customer: &CustomerIdn) -> PathBuf {
    paths::hashes_path(root, customer)
}

/// Load the ledger for `customer`.
///
/// Returns an empty store if the file does not yet exist.
pub fn load_at(root: &Path, customer: &CustomerIdn) -> Result<HashStore, SyncError> {
    let path = store_path_at(root, customer);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HashStore::new()),
        Err(err) => return Err(io_err(&path, err)),
    };
    Ok(serde_json::from_str(&contents)?)
}

/// Save the ledger for `customer` atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_at(root: &Path, customer: &CustomerIdn, store: &HashStore) -> Result<(), SyncError> {
    let path = store_path_at(root, customer);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid hash store path"),
        ));
    };

    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(store)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// SHA-256 hex digest of `content` with `\r\n` normalized to `\n`.
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    let mut rest = content;
    while let Some(pos) = rest.windows(2).position(|w| w == b"\r\n") {
        hasher.update(&rest[..pos]);
        hasher.update(b"\n");
        rest = &rest[pos + 2..];
    }
    hasher.update(rest);
    hex::encode(hasher.finalize())
}

/// Digest of the empty file; stands in for an absent local file.
pub fn empty_hash() -> String {
    hash_bytes(&[])
}

/// Read a file, returning `None` when it does not exist.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Digest of the file at `path`, `None` when it does not exist.
pub fn hash_file(path: &Path) -> Result<Option<String>, SyncError> {
    Ok(read_optional(path)?.map(|bytes| hash_bytes(&bytes)))
}
