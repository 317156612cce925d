//! CLI argument and failure-path tests
//!
//! None of these reach the network: each command fails validation or works
//! purely on local files.

use assert_cmd::Command;
use chrono::{Datelike, Utc};
use tempfile::TempDir;

fn cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ioda-pipeline").unwrap();
    cmd.current_dir(dir.path()).env("RUST_LOG", "ioda_pipeline=info");
    cmd
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_closeout_refuses_current_month() {
    let temp_dir = TempDir::new().unwrap();
    let month = Utc::now().format("%Y-%m").to_string();

    let output = cmd(&temp_dir)
        .args(["closeout", "--month", &month, "--dry-run"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stdout_of(&output).contains("Refusing to close out the current UTC month"));
}

#[test]
fn test_closeout_refuses_future_month() {
    let temp_dir = TempDir::new().unwrap();
    let month = format!("{}-01", Utc::now().year() + 1);

    let output = cmd(&temp_dir)
        .args(["closeout", "--month", &month, "--allow-current-month"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stdout_of(&output).contains(&format!("Target month {month} is in the future.")));
}

#[test]
fn test_closeout_rejects_malformed_month() {
    let temp_dir = TempDir::new().unwrap();
    let output = cmd(&temp_dir)
        .args(["closeout", "--month", "2026/02"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stdout_of(&output).contains("Expected YYYY-MM"));
}

#[test]
fn test_invalid_level_is_rejected_by_parser() {
    let temp_dir = TempDir::new().unwrap();
    cmd(&temp_dir)
        .args(["fetch", "--level", "province"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_invalid_chunk_mode_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let output = cmd(&temp_dir)
        .args(["fetch", "--initial-chunk-mode", "hour"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr_of(&output).contains("Unsupported chunk mode"));
}

#[test]
fn test_max_retries_range() {
    let temp_dir = TempDir::new().unwrap();
    cmd(&temp_dir)
        .args(["qa", "--max-retries", "0"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_invalid_start_date_fails_before_network() {
    let temp_dir = TempDir::new().unwrap();
    let output = cmd(&temp_dir)
        .args(["fetch", "--start", "20-02-2026", "--dry-run"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout_of(&output).contains("Unsupported date/time format"));
}

#[test]
fn test_fetch_requires_catalog() {
    let temp_dir = TempDir::new().unwrap();
    let output = cmd(&temp_dir)
        .args(["fetch", "--dry-run", "--start", "2026-02-20", "--end", "2026-02-21"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout_of(&output).contains("run `discover` first"));
}

#[test]
fn test_build_panel_and_qa_on_empty_workspace() {
    let temp_dir = TempDir::new().unwrap();

    let output = cmd(&temp_dir).args(["build-panel"]).output().unwrap();
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Built long rows: 0"));
    assert!(stdout.contains("No rows in long table."));
    assert!(temp_dir.path().join("data/processed/ioda_long.csv").exists());

    let output = cmd(&temp_dir).args(["qa"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("QA complete. summary rows=0"));
    let report = std::fs::read_to_string(temp_dir.path().join("docs/qa_report.md")).unwrap();
    assert!(report.starts_with("# QA Report"));
}
