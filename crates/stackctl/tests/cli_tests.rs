//! CLI integration tests for stackctl
//!
//! Exercises the command surface that needs no container engine:
//! - help output lists every subcommand
//! - restore without an artifact prints usage and exits non-zero
//! - update without versions is rejected before any side effect
//! - configuration errors exit with EX_CONFIG
//! - list works against an empty store

use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn stackctl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_stackctl"))
}

fn write_config(dir: &std::path::Path) -> PathBuf {
    let contents = format!(
        "APP_VERSION=1.64.0\n\
         PROTOCOL=http\n\
         DB_NAME=flows\n\
         DB_USER=flows\n\
         DB_PASSWORD=secret\n\
         ENCRYPTION_KEY=0123456789abcdef0123456789abcdef\n\
         TIMEZONE=Europe/Oslo\n\
         BACKUP_DIR={}\n",
        dir.join("backups").display()
    );
    let path = dir.join("stack.env");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_help_lists_subcommands() {
    let output = stackctl().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["backup", "restore", "update", "status", "list"] {
        assert!(stdout.contains(subcommand), "help missing {}", subcommand);
    }
}

#[test]
fn test_restore_without_artifact_prints_usage_and_fails() {
    let output = stackctl().arg("restore").output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.to_lowercase().contains("usage"));
}

#[test]
fn test_update_without_versions_is_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = stackctl()
        .args(["update", "--config"])
        .arg(&config)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid request"));
    // No backup directory was created, no lock file left behind.
    assert!(!dir.path().join("backups").exists());
}

#[test]
fn test_missing_config_exits_with_config_code() {
    let output = stackctl()
        .args(["backup", "--config", "/nonexistent/stack.env"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(78));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("configuration error"));
}

#[test]
fn test_incomplete_config_names_missing_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.env");
    fs::write(&path, "APP_VERSION=1.0.0\n").unwrap();

    let output = stackctl()
        .args(["backup", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(78));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("DB_PASSWORD"));
    assert!(stderr.contains("TIMEZONE"));
}

#[test]
fn test_list_with_empty_store_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = stackctl()
        .args(["list", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No artifacts"));
}

#[test]
fn test_commands_log_the_configuration_source() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = stackctl()
        .env_remove("RUST_LOG")
        .args(["list", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Using configuration"));
    assert!(stderr.contains("stack.env"));
}

#[test]
fn test_list_orders_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let backups = dir.path().join("backups");
    fs::create_dir_all(&backups).unwrap();
    fs::write(backups.join("backup_20260810_120000.tar.gz"), b"x").unwrap();
    fs::write(backups.join("backup_20260812_120000.tar.gz"), b"x").unwrap();

    let output = stackctl()
        .args(["list", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let newer = stdout.find("backup_20260812_120000.tar.gz").unwrap();
    let older = stdout.find("backup_20260810_120000.tar.gz").unwrap();
    assert!(newer < older);
}
