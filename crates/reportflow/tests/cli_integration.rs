//! CLI integration tests for the reportflow command-line interface.
//!
//! These tests verify:
//! - Help text is displayed correctly
//! - Settings documents are loaded, validated and listed offline
//! - Invalid inputs are rejected with appropriate messages
//!
//! Note: These tests never contact the analytics API.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a command for the reportflow binary with logs kept in `dir`.
fn reportflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("reportflow").unwrap();
    cmd.arg("--log-dir")
        .arg(dir.join("logs"))
        .env_remove("REPORTFLOW_CONFIG")
        .env_remove("REPORTFLOW_CLIENT_ID")
        .env_remove("REPORTFLOW_CLIENT_SECRET")
        .env_remove("RUST_LOG")
        .current_dir(dir);
    cmd
}

const VALID_SETTINGS: &str = r#"
[api]
environment = "example.invalid"

[custom_data]
interval = "PT1H"

[jobs.hourly]
cron = "0 * * * *"

[jobs.hourly.configurations.queues.executionPlan.queues]
type = "GetQueues"
strategy = "single"
getAllPages = true

[jobs.hourly.configurations.queues.templates.list]
template = "{% for q in data.queues.entities %}{{ q.name }}\n{% endfor %}"
fileName = "queues.txt"

[jobs.hourly.configurations.queues.exports.disk]
type = "file"
destination = "out"

[jobs.adhoc.configurations.only.templates.t]
template = "hello"
fileName = "hello.txt"
"#;

fn write_settings(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("reportflow.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    reportflow(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("schedule"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("jobs"));
}

#[test]
fn test_version_displays() {
    let dir = tempfile::tempdir().unwrap();
    reportflow(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("reportflow"));
}

#[test]
fn test_run_help_shows_jobs_flag() {
    let dir = tempfile::tempdir().unwrap();
    reportflow(dir.path())
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--jobs"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_settings_fails() {
    let dir = tempfile::tempdir().unwrap();
    reportflow(dir.path())
        .args(["--config", "nope.json", "validate"])
        .assert()
        .failure();
}

#[test]
fn test_validate_valid_settings() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(dir.path(), VALID_SETTINGS);
    reportflow(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("hourly"))
        .stdout(predicate::str::contains("adhoc"))
        .stdout(predicate::str::contains("Settings are valid"));
}

#[test]
fn test_validate_rejects_unknown_export_type() {
    let dir = tempfile::tempdir().unwrap();
    let settings = VALID_SETTINGS.replace(r#"type = "file""#, r#"type = "ftp""#);
    let path = write_settings(dir.path(), &settings);
    reportflow(dir.path())
        .arg("--config")
        .arg(&path)
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("unknown export type"));
}

#[test]
fn test_validate_rejects_unknown_request_type() {
    let dir = tempfile::tempdir().unwrap();
    let settings = VALID_SETTINGS.replace(r#"type = "GetQueues""#, r#"type = "GetSkills""#);
    write_settings(dir.path(), &settings);
    reportflow(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("unknown request type"));
}

#[test]
fn test_validate_resolves_refs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("shared.json"),
        r#"{"queues": {"type": "GetQueues", "strategy": "single"}}"#,
    )
    .unwrap();
    let path = dir.path().join("reportflow.json");
    std::fs::write(
        &path,
        r#"{
            "jobs": {
                "shared": {
                    "configurations": {
                        "c": {"executionPlan": {"queues": {"$ref": "shared.json#/queues"}}}
                    }
                }
            }
        }"#,
    )
    .unwrap();
    reportflow(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 tasks"));
}

#[test]
fn test_jobs_json_lists_schedules() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(dir.path(), VALID_SETTINGS);
    let output = reportflow(dir.path())
        .args(["jobs", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let jobs: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(jobs[0]["name"], "hourly");
    assert_eq!(jobs[0]["cron"], "0 * * * *");
    assert!(jobs[0]["next_run"].is_string());
    assert_eq!(jobs[0]["configurations"][0], "queues");
    assert_eq!(jobs[1]["name"], "adhoc");
    assert!(jobs[1]["cron"].is_null());
}

#[test]
fn test_run_without_credentials_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_settings(dir.path(), VALID_SETTINGS);
    reportflow(dir.path())
        .args(["run", "--jobs", "adhoc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("client id"));
}
