//! CLI parsing tests for the tagtrace command
//!
//! Tests that verify CLI argument parsing works correctly.

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a Command for the tagtrace binary
#[allow(deprecated)]
fn tagtrace() -> Command {
    Command::cargo_bin("tagtrace").expect("Failed to find tagtrace binary")
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_shows_all_commands() {
    tagtrace()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("chain"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn test_version_flag() {
    tagtrace()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tagtrace"));
}

#[test]
fn test_global_options_in_help() {
    tagtrace()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--project"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--data-dir"))
        .stdout(predicate::str::contains("--verbose"))
        .stdout(predicate::str::contains("--quiet"));
}

// ============================================================================
// Subcommand Help Tests
// ============================================================================

#[test]
fn test_migrate_help() {
    tagtrace()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--input"))
        .stdout(predicate::str::contains("--mode"))
        .stdout(predicate::str::contains("--strict"))
        .stdout(predicate::str::contains("--no-backup"));
}

#[test]
fn test_chain_help() {
    tagtrace()
        .args(["chain", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--direction"))
        .stdout(predicate::str::contains("--max-depth"));
}

#[test]
fn test_rollback_help() {
    tagtrace()
        .args(["rollback", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--list"));
}

#[test]
fn test_watch_help() {
    tagtrace()
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--no-rebuild"))
        .stdout(predicate::str::contains("--duration"));
}

// ============================================================================
// Invalid Argument Tests
// ============================================================================

#[test]
fn test_unknown_command_fails() {
    tagtrace().arg("frobnicate").assert().failure();
}

#[test]
fn test_chain_requires_key() {
    tagtrace()
        .arg("chain")
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY"));
}

#[test]
fn test_invalid_direction_rejected() {
    tagtrace()
        .args(["chain", "REQ:A1", "--direction", "sideways"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown direction"));
}

#[test]
fn test_invalid_migration_mode_rejected() {
    tagtrace()
        .args(["migrate", "--mode", "partial"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown migration mode"));
}
