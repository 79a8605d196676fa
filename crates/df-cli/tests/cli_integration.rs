//! CLI integration tests
//!
//! Tests the deskfleet binary using assert_cmd.

use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn deskfleet() -> Command {
    let mut cmd = Command::cargo_bin("deskfleet")
        .expect("Failed to locate deskfleet binary - ensure it's built before running tests");
    cmd.env_remove("DESKFLEET_PASSWORD").env_remove("RUST_LOG");
    cmd
}

/// Config file pointing the control port at `port`
fn write_config(dir: &TempDir, port: u16) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!("[fleet]\nadmin_user = \"admin\"\ncontrol_port = {}\n", port),
    )
    .unwrap();
    path
}

/// A loopback port nothing listens on
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_cli_help() {
    deskfleet()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deskfleet"))
        .stdout(predicate::str::contains("Desktop fleet control"));
}

#[test]
fn test_cli_version() {
    deskfleet()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("deskfleet"));
}

#[test]
fn test_cli_tunnel_help() {
    deskfleet()
        .args(["tunnel", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_cli_unknown_command() {
    deskfleet()
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_cli_config_path_honours_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fleet.toml");
    deskfleet()
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("fleet.toml"));
}

#[test]
fn test_cli_config_init_then_get() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    deskfleet()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    deskfleet()
        .args(["config", "get", "network.admin_port", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("22"));

    deskfleet()
        .args(["config", "get", "network.nope", "--config"])
        .arg(&path)
        .assert()
        .failure();
}

#[test]
fn test_cli_config_show_without_file_prints_defaults() {
    let dir = TempDir::new().unwrap();
    deskfleet()
        .args(["config", "show", "--config"])
        .arg(dir.path().join("absent.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("control_port"));
}

#[test]
fn test_cli_actions_include_config_templates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[actions.lock_screen]\ncommand = \"loginctl lock-sessions\"\n",
    )
    .unwrap();

    deskfleet()
        .args(["actions", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("get_system_info"))
        .stdout(predicate::str::contains("reboot"))
        .stdout(predicate::str::contains("lock_screen"));
}

#[test]
fn test_cli_exec_requires_password() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, closed_port());
    deskfleet()
        .args(["exec", "192.168.0.105", "get_system_info", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("DESKFLEET_PASSWORD"));
}

#[test]
fn test_cli_exec_rejects_bad_payload() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, closed_port());
    deskfleet()
        .args(["exec", "192.168.0.105", "kill_process", "--payload", "[1]", "--config"])
        .arg(&path)
        .env("DESKFLEET_PASSWORD", "pw")
        .assert()
        .failure()
        .stderr(predicate::str::contains("JSON object"));
}

#[test]
fn test_cli_reports_missing_daemon() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, closed_port());
    deskfleet()
        .args(["tunnel", "list", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Is it running"));
}

#[test]
fn test_cli_stop_without_daemon_warns() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, closed_port());
    deskfleet()
        .args(["stop", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("not running"));
}

struct Daemon(Child);

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_daemon(config: &Path) -> Daemon {
    let child = std::process::Command::new(assert_cmd::cargo::cargo_bin("deskfleet"))
        .args(["serve", "--foreground", "--config"])
        .arg(config)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start daemon");
    Daemon(child)
}

fn wait_for_port(port: u16) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("daemon did not start listening on {}", port);
}

#[test]
fn test_cli_serve_list_and_stop() {
    let dir = TempDir::new().unwrap();
    let port = closed_port();
    let path = write_config(&dir, port);
    let mut daemon = spawn_daemon(&path);
    wait_for_port(port);

    deskfleet()
        .args(["tunnel", "list", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("No active tunnels"));

    deskfleet()
        .args(["tunnel", "stop", "192.168.0.105", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("404"));

    deskfleet()
        .args(["stop", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Orchestrator stopped"));

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if daemon.0.try_wait().unwrap().is_some() {
            break;
        }
        assert!(Instant::now() < deadline, "daemon did not exit after stop");
        std::thread::sleep(Duration::from_millis(50));
    }
}
