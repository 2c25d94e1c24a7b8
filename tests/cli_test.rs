//! CLI integration tests
//!
//! Each test points the binary at a fresh data directory through
//! `QUIRE_DATA_DIR` and at a config file that keeps remote sync disabled.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

mod common;

const OFFLINE_CONFIG: &str = r#"
store:
  max_sessions: 5
remote:
  enabled: false
"#;

fn quire(config: &Path, data: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("quire").unwrap();
    cmd.env("QUIRE_DATA_DIR", data.path())
        .env("NO_COLOR", "1")
        .env_remove("QUIRE_REMOTE_ENABLED")
        .arg("--config")
        .arg(config);
    cmd
}

fn created_id(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    text.split_whitespace()
        .last()
        .expect("session id in output")
        .to_string()
}

#[test]
fn test_version_flag() {
    let mut cmd = Command::cargo_bin("quire").unwrap();
    cmd.arg("--version");
    cmd.assert().success();
}

#[test]
fn test_session_commands_round_trip() {
    let (_cfg_dir, config) = common::temp_config_file(OFFLINE_CONFIG);
    let data = TempDir::new().unwrap();

    let output = quire(&config, &data)
        .args(["sessions", "new"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created session"))
        .get_output()
        .stdout
        .clone();
    let id = created_id(&output);

    quire(&config, &data)
        .args(["sessions", "rename", &id, "Oncology Notes"])
        .assert()
        .success();
    quire(&config, &data)
        .args(["sessions", "pin", &id])
        .assert()
        .success();

    quire(&config, &data)
        .args(["sessions", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Oncology Notes"))
        .stdout(predicate::str::contains("\"pinned\": true"));

    quire(&config, &data)
        .args(["sessions", "clear"])
        .assert()
        .success();
    quire(&config, &data)
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No sessions found."));
}

#[test]
fn test_save_from_file_derives_title() {
    let (cfg_dir, config) = common::temp_config_file(OFFLINE_CONFIG);
    let data = TempDir::new().unwrap();

    let messages = serde_json::to_string(&common::conversation("What drives metastasis?")).unwrap();
    let file = cfg_dir.path().join("chat.json");
    std::fs::write(&file, messages).unwrap();

    quire(&config, &data)
        .args(["sessions", "save", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved session"));

    quire(&config, &data)
        .args(["sessions", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("What drives metastasis?"));
}

#[test]
fn test_unknown_session_fails() {
    let (_cfg_dir, config) = common::temp_config_file(OFFLINE_CONFIG);
    let data = TempDir::new().unwrap();

    quire(&config, &data)
        .args(["sessions", "rename", "missing", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Session not found"));
}

#[test]
fn test_identity_import_validation() {
    let (_cfg_dir, config) = common::temp_config_file(OFFLINE_CONFIG);
    let data = TempDir::new().unwrap();

    quire(&config, &data)
        .args(["identity", "import", "not-a-token"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fp_"));

    quire(&config, &data)
        .args(["identity", "import", "fp_abc123"])
        .assert()
        .success();

    quire(&config, &data)
        .args(["identity", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fp_abc123"));
}

#[test]
fn test_sync_reports_disabled_remote() {
    let (_cfg_dir, config) = common::temp_config_file(OFFLINE_CONFIG);
    let data = TempDir::new().unwrap();

    quire(&config, &data)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Remote sync is disabled"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_cfg_dir, config) = common::temp_config_file("store:\n  max_sessions: 0\n");
    let data = TempDir::new().unwrap();

    quire(&config, &data)
        .args(["sessions", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_sessions"));
}
