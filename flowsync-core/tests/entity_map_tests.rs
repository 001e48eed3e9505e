//! Entity-map persistence, metadata document, and error-message tests.
//! Storage: <root>/.flowsync/<customer>/map.json

use assert_fs::prelude::*;
use flowsync_core::{
    metadata, paths, project_map, AgentEntry, CoreError, CustomerIdn, FlowEntry, ProjectEntry,
    ProjectMap, SkillInfo,
};
use predicates::prelude::predicate;
use std::fs;

fn acme() -> CustomerIdn {
    CustomerIdn::from("acme")
}

fn sample_map() -> ProjectMap {
    let mut flow = FlowEntry {
        id: "flow-1".to_string(),
        title: "Main flow".to_string(),
        runner_type: "guidance".to_string(),
        ..FlowEntry::default()
    };
    flow.skills.insert(
        "greet".to_string(),
        SkillInfo {
            id: "skill-1".to_string(),
            idn: "greet".to_string(),
            title: "Greet".to_string(),
            runner_type: "nsl".to_string(),
            model: None,
            parameters: vec![],
            path: "projects/acme/support/bot/main/greet.nsl".to_string(),
            updated_at: None,
        },
    );
    let mut agent = AgentEntry {
        id: "agent-1".to_string(),
        title: "Bot".to_string(),
        ..AgentEntry::default()
    };
    agent.flows.insert("main".to_string(), flow);
    let mut project = ProjectEntry {
        id: "project-1".to_string(),
        idn: "support".to_string(),
        path: "projects/acme/support".to_string(),
        ..ProjectEntry::default()
    };
    project.agents.insert("bot".to_string(), agent);
    let mut map = ProjectMap::default();
    map.projects.insert("support".to_string(), project);
    map
}

// ---------------------------------------------------------------------------
// 1. Persistence
// ---------------------------------------------------------------------------

#[test]
fn save_creates_pretty_json_with_0600() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    project_map::save_at(root.path(), &acme(), &sample_map()).expect("save");

    root.child(".flowsync/acme/map.json")
        .assert(predicate::path::exists());
    root.child(".flowsync/acme/map.json")
        .assert(predicate::str::contains("\n  \"projects\""));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = paths::map_path(root.path(), &acme());
        let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }
}

#[test]
fn mid_write_crash_leaves_original_intact() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    project_map::save_at(root.path(), &acme(), &sample_map()).expect("save");

    let path = paths::map_path(root.path(), &acme());
    let original = fs::read(&path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    assert_eq!(fs::read(&path).expect("read"), original);
    let loaded = project_map::load_at(root.path(), &acme()).expect("load");
    assert_eq!(loaded, sample_map());
}

#[test]
fn customers_are_isolated() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    project_map::save_at(root.path(), &acme(), &sample_map()).expect("save");
    let other = project_map::load_at(root.path(), &CustomerIdn::from("globex")).expect("load");
    assert!(other.projects.is_empty());
}

#[test]
fn wrong_shape_returns_parse_error() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child(".flowsync/acme/map.json")
        .write_str("[\"a list, not a map\"]")
        .expect("write");
    let err = project_map::load_at(root.path(), &acme()).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Generated project document
// ---------------------------------------------------------------------------

#[test]
fn project_document_lists_every_skill_path() {
    let map = sample_map();
    let doc = metadata::render_project_flows(&map.projects["support"]).expect("render");
    assert!(doc.contains("agent: bot"));
    assert!(doc.contains("path: projects/acme/support/bot/main/greet.nsl"));
    assert!(!doc.contains("skill-1"), "remote ids stay in map.json only");
}
