//! End-to-end tests for the oop-worker binary
//!
//! Each test spawns the real binary with its own storage root and
//! diagnostics file, then checks exit status and what was logged.

#![cfg(unix)]

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::io::Read;
use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const WORKER: &str = env!("CARGO_BIN_EXE_oop-worker");

fn worker(store: &Path, remote: &str, log_levels: &str, sink: &Path) -> Command {
    let mut cmd = Command::new(WORKER);
    cmd.arg(store)
        .arg(remote)
        .arg(log_levels)
        .arg(sink)
        .arg("--no-resource-limits")
        .env_remove("OOP_WORKER_LOG");
    cmd
}

fn wait_for_log(path: &Path, needle: &str, timeout: Duration) -> String {
    let deadline = Instant::now() + timeout;
    loop {
        let contents = fs::read_to_string(path).unwrap_or_default();
        if contents.contains(needle) || Instant::now() > deadline {
            return contents;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn unreachable_host_exits_non_zero_without_starting_engine() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logs").join("worker.log");
    let remote = format!("127.0.0.1:{}", closed_port());

    let status = worker(&dir.path().join("store"), &remote, "", &log)
        .stdin(Stdio::null())
        .status()
        .unwrap();

    assert!(!status.success());
    assert_eq!(status.code(), Some(1));

    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("Failed to connect to"), "log was: {}", contents);
    assert!(!contents.contains("Drain engine started"));
}

#[test]
fn stdio_run_ends_cleanly_when_host_closes_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("worker.log");
    let store = dir.path().join("store");

    let output = worker(&store, "", "", &log)
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(output.status.success());
    // Diagnostics never leak into the protocol channel.
    assert!(output.stdout.is_empty());
    assert!(store.is_dir());

    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("Transport ready: stdio"), "log was: {}", contents);
    assert!(!contents.contains(" ERROR "));
}

#[test]
fn connected_run_ends_cleanly_when_host_hangs_up() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("worker.log");
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let remote = listener.local_addr().unwrap().to_string();

    let host = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 16];
        // Hang up without sending anything.
        stream.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let _ = stream.read(&mut buf);
    });

    let status = worker(&dir.path().join("store"), &remote, "", &log)
        .stdin(Stdio::null())
        .status()
        .unwrap();
    host.join().unwrap();

    assert!(status.success());
    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("Protocol engine finished"), "log was: {}", contents);
}

#[test]
fn interrupt_is_a_clean_stop() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("worker.log");

    let mut child = worker(&dir.path().join("store"), "", "", &log)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .unwrap();

    let ready = wait_for_log(&log, "Drain engine started", Duration::from_secs(10));
    assert!(ready.contains("Drain engine started"), "log was: {}", ready);

    kill(Pid::from_raw(child.id() as i32), Signal::SIGINT).unwrap();
    let status = child.wait().unwrap();
    drop(child.stdin.take());

    assert!(status.success());
    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("Interrupted by signal"), "log was: {}", contents);
    assert!(!contents.contains(" ERROR "));
}

#[test]
fn log_level_overrides_reach_the_sink() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("worker.log");

    let status = worker(&dir.path().join("store"), "", "oop_worker:DEBUG", &log)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .unwrap();

    assert!(status.success());
    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("DEBUG"), "log was: {}", contents);
    assert!(contents.contains("Startup configuration"));
}

#[test]
fn help_and_version() {
    let help = Command::new(WORKER).arg("--help").output().unwrap();
    assert!(help.status.success());
    let text = String::from_utf8_lossy(&help.stdout);
    assert!(text.contains("STORAGE_ROOT"));
    assert!(text.contains("--listen"));

    let version = Command::new(WORKER).arg("--version").output().unwrap();
    assert!(version.status.success());
    assert!(String::from_utf8_lossy(&version.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn conflicting_transports_exit_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(WORKER)
        .arg(dir.path())
        .arg("127.0.0.1:1")
        .args(["--listen", "2"])
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Only one of"));
}

#[test]
fn omitted_storage_root_defaults_under_home() {
    let home = tempfile::tempdir().unwrap();
    let log = home.path().join("worker.log");

    let status = Command::new(WORKER)
        .args(["", "", "oop_worker:INFO"])
        .arg(&log)
        .arg("--no-resource-limits")
        .env("HOME", home.path())
        .env_remove("OOP_WORKER_LOG")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .unwrap();

    assert!(status.success());
    let default_root = home.path().join(".codeintel");
    assert!(default_root.is_dir());

    let contents = fs::read_to_string(&log).unwrap();
    assert!(
        contents.contains(&format!("storage root {}", default_root.display())),
        "log was: {}",
        contents
    );
}
