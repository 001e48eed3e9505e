//! Offline workspace status.
//!
//! Compares every tracked skill against the ledger without touching the
//! remote platform:
//!
//! 1. `Missing`: script tracked in the map but absent on disk (push would
//!    delete it remotely)
//! 2. `Modified`: script or skill metadata differs from its ledger digest
//! 3. `Untracked`: `<skill>.meta.yaml` under a tracked flow with no map
//!    entry (push would create it)
//! 4. `Clean`
//!
//! A workspace whose ledger is missing or empty is reported as never synced.

use std::path::Path;

use serde::Serialize;

use flowsync_core::{paths, project_map, CustomerIdn};

use crate::error::SyncError;
use crate::hash_store;
use crate::push::untracked_meta_files;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Clean,
    Modified,
    Missing,
    Untracked,
}

impl FileState {
    pub fn label(self) -> &'static str {
        match self {
            FileState::Clean => "clean",
            FileState::Modified => "modified",
            FileState::Missing => "missing",
            FileState::Untracked => "untracked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub path: String,
    pub state: FileState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub never_synced: bool,
    /// Sorted by path.
    pub entries: Vec<StatusEntry>,
}

impl StatusReport {
    pub fn count(&self, state: FileState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    /// `true` when nothing would be pushed.
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|e| e.state == FileState::Clean)
    }
}

pub fn check(root: &Path, customer: &CustomerIdn) -> Result<StatusReport, SyncError> {
    let ledger = hash_store::load_at(root, customer)?;
    let map = project_map::load_at(root, customer)?;
    if ledger.is_empty() {
        return Ok(StatusReport {
            never_synced: true,
            entries: Vec::new(),
        });
    }

    let mut entries = Vec::new();
    for key in map.flow_keys() {
        let Some(flow) = map.flow(&key) else {
            continue;
        };
        let flow_dir = paths::flow_dir(
            root,
            customer,
            &key.project_idn,
            &key.agent_idn,
            &key.flow_idn,
        );

        for info in flow.skills.values() {
            let script = paths::resolve_key(root, &info.path);
            let state = match hash_store::hash_file(&script)? {
                None => FileState::Missing,
                Some(hash) if ledger.get(&info.path) == Some(&hash) => FileState::Clean,
                Some(_) => FileState::Modified,
            };
            entries.push(StatusEntry {
                path: info.path.clone(),
                state,
            });

            let meta_path = paths::skill_meta_path(&flow_dir, &info.idn);
            let meta_key = paths::ledger_key(root, &meta_path);
            if let Some(hash) = hash_store::hash_file(&meta_path)? {
                if ledger.get(&meta_key) != Some(&hash) {
                    entries.push(StatusEntry {
                        path: meta_key,
                        state: FileState::Modified,
                    });
                }
            }
        }

        for meta_path in untracked_meta_files(&flow_dir, &flow.skills)? {
            entries.push(StatusEntry {
                path: paths::ledger_key(root, &meta_path),
                state: FileState::Untracked,
            });
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(StatusReport {
        never_synced: false,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use flowsync_core::{AgentEntry, FlowEntry, ProjectEntry, ProjectMap, SkillInfo};
    use tempfile::TempDir;

    use crate::hash_store::{hash_bytes, HashStore};

    const FLOW: &str = "projects/acme/support/bot/main";

    fn acme() -> CustomerIdn {
        CustomerIdn::from("acme")
    }

    fn skill(idn: &str) -> SkillInfo {
        SkillInfo {
            id: format!("id-{idn}"),
            idn: idn.to_string(),
            title: String::new(),
            runner_type: "nsl".to_string(),
            model: None,
            parameters: vec![],
            path: format!("{FLOW}/{idn}.nsl"),
            updated_at: None,
        }
    }

    /// Tracks `greet` and `bye`, both written and recorded as "v1".
    fn setup() -> TempDir {
        let root = TempDir::new().unwrap();
        let mut flow = FlowEntry {
            id: "flow-1".to_string(),
            ..FlowEntry::default()
        };
        let mut ledger = HashStore::new();
        fs::create_dir_all(root.path().join(FLOW)).unwrap();
        for idn in ["greet", "bye"] {
            let info = skill(idn);
            fs::write(root.path().join(&info.path), "v1\n").unwrap();
            ledger.insert(info.path.clone(), hash_bytes(b"v1\n"));
            flow.skills.insert(idn.to_string(), info);
        }
        let mut agent = AgentEntry::default();
        agent.flows.insert("main".to_string(), flow);
        let mut project = ProjectEntry {
            idn: "support".to_string(),
            path: "projects/acme/support".to_string(),
            ..ProjectEntry::default()
        };
        project.agents.insert("bot".to_string(), agent);
        let mut map = ProjectMap::default();
        map.projects.insert("support".to_string(), project);

        project_map::save_at(root.path(), &acme(), &map).unwrap();
        hash_store::save_at(root.path(), &acme(), &ledger).unwrap();
        root
    }

    #[test]
    fn never_synced_without_ledger() {
        let root = TempDir::new().unwrap();
        let report = check(root.path(), &acme()).unwrap();
        assert!(report.never_synced);
        assert!(report.entries.is_empty());
    }

    #[test]
    fn clean_after_sync() {
        let root = setup();
        let report = check(root.path(), &acme()).unwrap();
        assert!(!report.never_synced);
        assert!(report.is_clean());
        assert_eq!(report.count(FileState::Clean), 2);
    }

    #[test]
    fn crlf_rewrite_is_still_clean() {
        let root = setup();
        fs::write(root.path().join(FLOW).join("greet.nsl"), "v1\r\n").unwrap();
        assert!(check(root.path(), &acme()).unwrap().is_clean());
    }

    #[test]
    fn classifies_modified_missing_untracked() {
        let root = setup();
        let flow_dir = root.path().join(FLOW);
        fs::write(flow_dir.join("greet.nsl"), "v2\n").unwrap();
        fs::remove_file(flow_dir.join("bye.nsl")).unwrap();
        fs::write(flow_dir.join("fresh.meta.yaml"), "idn: fresh\n").unwrap();

        let report = check(root.path(), &acme()).unwrap();
        let summary: Vec<(&str, FileState)> = report
            .entries
            .iter()
            .map(|e| (e.path.as_str(), e.state))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("projects/acme/support/bot/main/bye.nsl", FileState::Missing),
                ("projects/acme/support/bot/main/fresh.meta.yaml", FileState::Untracked),
                ("projects/acme/support/bot/main/greet.nsl", FileState::Modified),
            ]
        );
        assert!(!report.is_clean());
    }

    #[test]
    fn edited_skill_metadata_is_modified() {
        let root = setup();
        let meta = root.path().join(FLOW).join("greet.meta.yaml");
        fs::write(&meta, "idn: greet\ntitle: Hello\n").unwrap();
        let report = check(root.path(), &acme()).unwrap();
        assert_eq!(report.count(FileState::Modified), 1);
        assert_eq!(
            report.entries.iter().find(|e| e.state == FileState::Modified).unwrap().path,
            "projects/acme/support/bot/main/greet.meta.yaml"
        );
    }
}
