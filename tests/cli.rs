//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes a config whose audit log lives inside `dir`
fn write_config(dir: &Path, require_whitelist: bool) -> (PathBuf, PathBuf) {
    let log_path = dir.join("receipts.jsonl");
    let config_path = dir.join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[gate]\nrequire_whitelist = {}\n\n[audit]\nlog_path = {:?}\n",
            require_whitelist,
            log_path.display().to_string()
        ),
    )
    .unwrap();
    (config_path, log_path)
}

fn opsgate(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("opsgate").unwrap();
    cmd.env("OPSGATE_CONFIG", config).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_check_help() {
    let mut cmd = Command::cargo_bin("opsgate").unwrap();
    cmd.arg("check").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Evaluate a statement"));
}

#[test]
fn test_check_approved_statement() {
    let tmp = TempDir::new().unwrap();
    let (config, log) = write_config(tmp.path(), true);

    opsgate(&config)
        .args(["check", "--statement", "SELECT * FROM orders", "--allow", "orders"])
        .args(["--format", "json", "--request-id", "req-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"APPROVED\""))
        .stdout(predicate::str::contains("\"requestId\": \"req-1\""));

    let content = std::fs::read_to_string(log).unwrap();
    assert_eq!(content.lines().count(), 1);
}

#[test]
fn test_check_blocked_statement_exit_code() {
    let tmp = TempDir::new().unwrap();
    let (config, _) = write_config(tmp.path(), true);

    opsgate(&config)
        .args(["check", "--statement", "SELECT 1; DROP TABLE users", "--allow", "orders"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("BLOCKED"))
        .stdout(predicate::str::contains("CHAINED_DANGEROUS_STATEMENT"));
}

#[test]
fn test_check_without_whitelist_fails_closed() {
    let tmp = TempDir::new().unwrap();
    let (config, _) = write_config(tmp.path(), true);

    opsgate(&config)
        .args(["check", "--statement", "SELECT * FROM orders", "--no-log"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Schema whitelist not provided"));
}

#[test]
fn test_check_reads_stdin_and_client_config() {
    let tmp = TempDir::new().unwrap();
    let (config, _) = write_config(tmp.path(), true);
    let client = tmp.path().join("acme.toml");
    std::fs::write(
        &client,
        r#"
client_id = "acme"

[[whitelist]]
table = "orders"

[[rules]]
id = "DA-1"
category = "Data Access"
rule = "Payroll data stays internal"
applies_to = ["hr_salaries"]
"#,
    )
    .unwrap();

    opsgate(&config)
        .args(["check", "--no-log", "--format", "json", "--client-config"])
        .arg(&client)
        .write_stdin("SELECT * FROM hr_salaries")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"clientId\": \"acme\""))
        .stdout(predicate::str::contains("DA-1"))
        .stdout(predicate::str::contains("Unauthorized table access: hr_salaries"));
}

#[test]
fn test_signatures_json() {
    let tmp = TempDir::new().unwrap();
    let (config, _) = write_config(tmp.path(), true);

    opsgate(&config)
        .args(["signatures", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"XP_CMDSHELL\""))
        .stdout(predicate::str::contains("\"kind\": \"sequence\""));
}

#[test]
fn test_retention_validate() {
    let tmp = TempDir::new().unwrap();
    let (config, _) = write_config(tmp.path(), true);

    opsgate(&config)
        .args(["retention", "validate", "30", "--jurisdiction", "GDPR"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("below minimum (90)"));

    opsgate(&config)
        .args(["retention", "validate", "120", "-j", "GDPR"])
        .assert()
        .success()
        .stdout(predicate::str::contains("VALID"));
}

#[test]
fn test_retention_policy_unknown_jurisdiction() {
    let tmp = TempDir::new().unwrap();
    let (config, _) = write_config(tmp.path(), true);

    opsgate(&config)
        .args(["retention", "policy", "UNKNOWN-CODE", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"code\": \"US-GENERAL\""))
        .stdout(predicate::str::contains("unknown_jurisdiction"));
}

#[test]
fn test_retention_expiry_warns_once_for_unknown_jurisdiction() {
    let tmp = TempDir::new().unwrap();
    let (config, _) = write_config(tmp.path(), true);

    let output = opsgate(&config)
        .args(["retention", "expiry", "ATLANTIS", "--days", "400"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Retain for 400 days"))
        .get_output()
        .clone();

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("Unknown jurisdiction: ATLANTIS").count(), 1);
}

#[test]
fn test_audit_verify_detects_tampering() {
    let tmp = TempDir::new().unwrap();
    let (config, log) = write_config(tmp.path(), false);

    opsgate(&config)
        .args(["check", "--statement", "DELETE FROM orders"])
        .assert()
        .code(2);

    opsgate(&config)
        .args(["audit", "verify"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 receipts verified"));

    let content = std::fs::read_to_string(&log).unwrap();
    let edited = content.replacen("\"clientId\":\"local\"", "\"clientId\":\"other\"", 1);
    assert_ne!(content, edited);
    std::fs::write(&log, edited).unwrap();

    opsgate(&config)
        .args(["audit", "verify", "--log"])
        .arg(&log)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("line 1"));
}

#[test]
fn test_audit_verify_detects_removed_receipt() {
    let tmp = TempDir::new().unwrap();
    let (config, log) = write_config(tmp.path(), false);

    for statement in ["SELECT 1", "DROP TABLE users", "SELECT 2"] {
        opsgate(&config).args(["check", "--statement", statement]).assert();
    }

    let content = std::fs::read_to_string(&log).unwrap();
    let without_blocked: Vec<&str> = content
        .lines()
        .filter(|line| !line.contains("\"BLOCKED\""))
        .collect();
    assert_eq!(without_blocked.len(), 2);
    std::fs::write(&log, without_blocked.join("\n") + "\n").unwrap();

    opsgate(&config)
        .args(["audit", "verify"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("line 2"))
        .stdout(predicate::str::contains("removed or reordered"));
}
