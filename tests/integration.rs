//! Integration tests for the blockd command line.
//!
//! None of these need root: client commands are pointed at sockets in a
//! temporary directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run blockd and return output
fn run_blockd(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_blockd"))
        .args(args)
        .output()
        .expect("Failed to execute blockd")
}

/// Write a config whose socket lives in `dir` (nothing listens there).
fn write_config(dir: &Path) -> PathBuf {
    let config = dir.join("config.yaml");
    std::fs::write(
        &config,
        format!("socket_path: {:?}\n", dir.join("blockd.sock").display().to_string()),
    )
    .unwrap();
    config
}

#[test]
fn test_version_command() {
    let output = run_blockd(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("blockd {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_command() {
    let output = run_blockd(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["run", "ping", "status", "start", "clear", "config"] {
        assert!(stdout.contains(subcommand), "missing {} in help", subcommand);
    }
}

#[test]
fn test_invalid_command() {
    let output = run_blockd(&["unblock-everything"]);
    assert!(!output.status.success());
}

#[test]
fn test_start_requires_end_time() {
    let output = run_blockd(&["start", "--domain", "x.com"]);
    assert!(!output.status.success());
}

#[test]
fn test_client_commands_without_daemon() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let config = config.to_str().unwrap();

    for args in [
        vec!["ping"],
        vec!["status"],
        vec!["clear"],
        vec!["start", "-d", "x.com", "--duration", "5m"],
    ] {
        let mut full = vec!["--config", config];
        full.extend(args.iter().copied());
        let output = run_blockd(&full);

        assert!(!output.status.success(), "{:?} should fail", args);
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("daemon not running or unresponsive"),
            "Unexpected stderr for {:?}: {}",
            args,
            stderr
        );
    }
}

#[test]
fn test_config_init_and_show() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("etc/config.yaml");
    let config = config.to_str().unwrap();

    let output = run_blockd(&["--config", config, "config", "init"]);
    assert!(output.status.success());

    let output = run_blockd(&["--config", config, "config", "show"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tick_interval_ms: 1000"));
    assert!(stdout.contains("firewall: auto"));

    // Second init refuses to clobber
    let output = run_blockd(&["--config", config, "config", "init"]);
    assert!(!output.status.success());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "tick_interval_ms: 5\n").unwrap();

    let output = run_blockd(&["--config", config.to_str().unwrap(), "config", "show"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("tick_interval_ms"), "stderr: {}", stderr);
}
