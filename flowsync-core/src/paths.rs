//! Workspace layout.
//!
//! ```text
//! <root>/
//!   flowsync.yaml                         workspace config
//!   .flowsync/
//!     locks/<operation>.lock              advisory locks
//!     <customer>/map.json                 entity map
//!     <customer>/hashes.json              change ledger
//!   projects/<customer>/<project>/
//!     flows.yaml                          generated project metadata
//!     <agent>/<flow>/flow.meta.yaml
//!     <agent>/<flow>/<skill>.meta.yaml
//!     <agent>/<flow>/<skill>.<nsl|guidance|jinja>
//! ```
//!
//! Ledger keys and map paths are workspace-relative with forward slashes;
//! [`ledger_key`] is the single normalizer.

use std::path::{Path, PathBuf};

use crate::types::{script_extension, CustomerIdn};

pub const CONFIG_FILE: &str = "flowsync.yaml";
pub const STATE_DIR: &str = ".flowsync";
pub const MAP_FILE: &str = "map.json";
pub const HASHES_FILE: &str = "hashes.json";
pub const PROJECT_METADATA_FILE: &str = "flows.yaml";
pub const FLOW_META_FILE: &str = "flow.meta.yaml";
pub const SKILL_META_SUFFIX: &str = ".meta.yaml";

pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn lock_dir(root: &Path) -> PathBuf {
    state_dir(root).join("locks")
}

pub fn customer_state_dir(root: &Path, customer: &CustomerIdn) -> PathBuf {
    state_dir(root).join(&customer.0)
}

pub fn map_path(root: &Path, customer: &CustomerIdn) -> PathBuf {
    customer_state_dir(root, customer).join(MAP_FILE)
}

pub fn hashes_path(root: &Path, customer: &CustomerIdn) -> PathBuf {
    customer_state_dir(root, customer).join(HASHES_FILE)
}

pub fn customer_projects_dir(root: &Path, customer: &CustomerIdn) -> PathBuf {
    root.join("projects").join(&customer.0)
}

pub fn project_dir(root: &Path, customer: &CustomerIdn, project_idn: &str) -> PathBuf {
    customer_projects_dir(root, customer).join(project_idn)
}

pub fn flow_dir(
    root: &Path,
    customer: &CustomerIdn,
    project_idn: &str,
    agent_idn: &str,
    flow_idn: &str,
) -> PathBuf {
    project_dir(root, customer, project_idn)
        .join(agent_idn)
        .join(flow_idn)
}

pub fn skill_script_path(flow_dir: &Path, skill_idn: &str, runner_type: &str) -> PathBuf {
    flow_dir.join(format!("{skill_idn}.{}", script_extension(runner_type)))
}

pub fn skill_meta_path(flow_dir: &Path, skill_idn: &str) -> PathBuf {
    flow_dir.join(format!("{skill_idn}{SKILL_META_SUFFIX}"))
}

/// Skill IDN of a `<idn>.meta.yaml` file name, `None` for anything else
/// (including `flow.meta.yaml`).
pub fn skill_idn_from_meta_file(file_name: &str) -> Option<&str> {
    if file_name == FLOW_META_FILE {
        return None;
    }
    file_name
        .strip_suffix(SKILL_META_SUFFIX)
        .filter(|stem| !stem.is_empty())
}

/// Normalize `path` into a ledger key: relative to `root`, forward slashes.
///
/// Paths outside `root` are kept whole (still slash-normalized).
pub fn ledger_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

/// Inverse of [`ledger_key`].
pub fn resolve_key(root: &Path, key: &str) -> PathBuf {
    root.join(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> CustomerIdn {
        CustomerIdn::from("acme")
    }

    #[test]
    fn state_files_live_under_customer_dir() {
        let root = Path::new("/ws");
        assert!(map_path(root, &acme()).ends_with(".flowsync/acme/map.json"));
        assert!(hashes_path(root, &acme()).ends_with(".flowsync/acme/hashes.json"));
        assert!(lock_dir(root).ends_with(".flowsync/locks"));
    }

    #[test]
    fn skill_paths_follow_runner_type() {
        let dir = flow_dir(Path::new("/ws"), &acme(), "support", "bot", "main");
        assert_eq!(
            skill_script_path(&dir, "greet", "nsl"),
            PathBuf::from("/ws/projects/acme/support/bot/main/greet.nsl")
        );
        assert_eq!(
            skill_meta_path(&dir, "greet"),
            PathBuf::from("/ws/projects/acme/support/bot/main/greet.meta.yaml")
        );
    }

    #[test]
    fn ledger_key_is_relative_and_forward_slashed() {
        let root = Path::new("/ws");
        let key = ledger_key(root, Path::new("/ws/projects/acme/p/a/f/s.nsl"));
        assert_eq!(key, "projects/acme/p/a/f/s.nsl");
        assert_eq!(resolve_key(root, &key), PathBuf::from("/ws/projects/acme/p/a/f/s.nsl"));
    }

    #[test]
    fn meta_file_names() {
        assert_eq!(skill_idn_from_meta_file("greet.meta.yaml"), Some("greet"));
        assert_eq!(skill_idn_from_meta_file("flow.meta.yaml"), None);
        assert_eq!(skill_idn_from_meta_file(".meta.yaml"), None);
        assert_eq!(skill_idn_from_meta_file("greet.nsl"), None);
    }
}
