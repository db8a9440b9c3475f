//! CLI integration tests.
//!
//! These run the built binary on paths that never reach the Docker daemon.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run `sb` with an isolated config directory and storage root.
fn sb(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sb"))
        .args(args)
        .env("XDG_CONFIG_HOME", root.join("config"))
        .env("SBHUB_STORAGE_ROOT", root.join("sandboxes"))
        .env_remove("SBHUB_CONFIG_CONTENT")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_version_command() {
    let dir = TempDir::new().unwrap();
    let output = sb(dir.path(), &["version"]);

    assert!(output.status.success());
    assert!(stdout(&output).starts_with("sb "));
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = sb(dir.path(), &["--help"]);

    assert!(output.status.success());
    let help = stdout(&output);
    for command in [
        "create", "attach", "detach", "renew", "remove", "list", "logs", "console", "save",
        "import", "janitor",
    ] {
        assert!(help.contains(command), "missing {} in help", command);
    }
    assert!(help.contains("--verbose"));
    assert!(help.contains("--config"));
}

#[test]
fn test_create_rejects_zero_ttl() {
    let dir = TempDir::new().unwrap();
    let output = sb(dir.path(), &["create", "web", "--ttl", "0s"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("greater than zero"));
}

#[test]
fn test_remove_flags_are_exclusive() {
    let dir = TempDir::new().unwrap();
    let output = sb(dir.path(), &["rm", "web", "--force-all", "--vol-only"]);

    assert!(!output.status.success());
}

#[test]
fn test_save_without_data_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let output = sb(dir.path(), &["save", "web", "v1"]);

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Error: no data found for 'web'"), "stderr: {}", err);
    assert!(!err.contains("panicked"));
}

#[test]
fn test_save_rejects_bad_name() {
    let dir = TempDir::new().unwrap();
    let output = sb(dir.path(), &["save", "../etc", "v1"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("invalid sandbox name"));
}

#[test]
fn test_save_and_remove_snapshot_offline() {
    let dir = TempDir::new().unwrap();
    let live = dir.path().join("sandboxes/web");
    std::fs::create_dir_all(&live).unwrap();
    std::fs::write(live.join("notes.txt"), "hello").unwrap();

    let output = sb(dir.path(), &["save", "web", "v1"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let snapshot = dir.path().join("sandboxes/web_snap_v1");
    assert_eq!(
        std::fs::read_to_string(snapshot.join("notes.txt")).unwrap(),
        "hello"
    );

    let output = sb(dir.path(), &["remove", "web_snap_v1"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(!snapshot.exists());
    assert!(live.exists());
}

#[test]
fn test_vol_only_remove_offline() {
    let dir = TempDir::new().unwrap();
    let live = dir.path().join("sandboxes/web");
    std::fs::create_dir_all(&live).unwrap();

    let output = sb(dir.path(), &["remove", "web", "--vol-only"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Deleted data for 'web'"));
    assert!(!live.exists());
}

#[test]
fn test_invalid_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.json");
    std::fs::write(&config, "{ not json").unwrap();

    let output = sb(
        dir.path(),
        &["--config", config.to_str().unwrap(), "save", "web", "v1"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("Error:"));
}
