use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = "\
default_customer: acme
customers:
  - idn: acme
    base_url: http://127.0.0.1:9
";

const MAP: &str = r#"{
  "projects": {
    "support": {
      "id": "p-1",
      "idn": "support",
      "path": "projects/acme/support",
      "agents": {
        "bot": {
          "id": "a-1",
          "flows": {
            "main": {
              "id": "f-1",
              "runner_type": "nsl",
              "skills": {
                "greet": {
                  "id": "s-1",
                  "idn": "greet",
                  "runner_type": "nsl",
                  "path": "projects/acme/support/bot/main/greet.nsl"
                }
              }
            }
          }
        }
      }
    }
  }
}"#;

fn flowsync(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("flowsync").unwrap();
    cmd.arg("--root")
        .arg(root)
        .env("XDG_CONFIG_HOME", root.join("no-user-config"))
        .env_remove("FLOWSYNC_LOG");
    cmd
}

/// A synced workspace whose only script no longer matches its ledger hash.
fn tracked_workspace() -> TempDir {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("flowsync.yaml"), CONFIG).unwrap();
    let state = root.path().join(".flowsync/acme");
    fs::create_dir_all(&state).unwrap();
    fs::write(state.join("map.json"), MAP).unwrap();
    fs::write(
        state.join("hashes.json"),
        r#"{ "projects/acme/support/bot/main/greet.nsl": "0000" }"#,
    )
    .unwrap();
    let flow = root.path().join("projects/acme/support/bot/main");
    fs::create_dir_all(&flow).unwrap();
    fs::write(flow.join("greet.nsl"), "edited locally\n").unwrap();
    fs::write(flow.join("draft.meta.yaml"), "idn: draft\nrunner_type: nsl\n").unwrap();
    root
}

#[test]
fn status_on_empty_workspace_reports_never_synced() {
    let root = TempDir::new().unwrap();

    flowsync(root.path())
        .args(["status", "--customer", "acme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("never been synced"));
}

#[test]
fn status_without_config_or_customer_fails() {
    let root = TempDir::new().unwrap();

    flowsync(root.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("flowsync.yaml"));
}

#[test]
fn status_table_lists_local_changes() {
    let root = tracked_workspace();

    flowsync(root.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 modified"))
        .stdout(predicate::str::contains("1 untracked"))
        .stdout(predicate::str::contains("greet.nsl"))
        .stdout(predicate::str::contains("draft.meta.yaml"));
}

#[test]
fn status_json_is_machine_readable() {
    let root = tracked_workspace();

    let output = flowsync(root.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["customer"], "acme");
    assert_eq!(json["never_synced"], false);
    assert_eq!(json["summary"]["modified"], 1);
    assert_eq!(json["summary"]["untracked"], 1);
    assert_eq!(
        json["files"][1]["path"],
        "projects/acme/support/bot/main/greet.nsl"
    );
    assert_eq!(json["files"][1]["state"], "modified");
}

#[test]
fn pull_without_api_key_names_the_variable() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("flowsync.yaml"), CONFIG).unwrap();

    flowsync(root.path())
        .arg("pull")
        .env_remove("FLOWSYNC_API_KEY")
        .assert()
        .failure()
        .stderr(predicate::str::contains("FLOWSYNC_API_KEY"));
}

#[test]
fn held_lock_makes_pull_busy() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("flowsync.yaml"), CONFIG).unwrap();
    let locks = root.path().join(".flowsync/locks");
    fs::create_dir_all(&locks).unwrap();
    fs::write(locks.join("pull.lock"), "").unwrap();

    flowsync(root.path())
        .arg("pull")
        .env("FLOWSYNC_API_KEY", "test-key")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already running"));

    assert!(locks.join("pull.lock").exists(), "foreign lock left alone");
}

#[test]
fn unknown_customer_is_rejected() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("flowsync.yaml"), CONFIG).unwrap();

    flowsync(root.path())
        .args(["push", "--customer", "globex"])
        .env("FLOWSYNC_API_KEY", "test-key")
        .assert()
        .failure()
        .stderr(predicate::str::contains("globex"));
}
