//! Process-wide stream rebinding by a file diagnostics sink
//!
//! Lives in its own test binary: installing the sink rebinds descriptors 1
//! and 2 for the whole process.

#![cfg(unix)]

use oop_worker::observability::DiagnosticsConfig;
use std::fs;
use std::io::{self, Write};

#[test]
fn file_sink_captures_process_stdout_and_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("diagnostics").join("worker.log");

    DiagnosticsConfig::configure(Some(log_path.to_str().unwrap()), &["rebind_check:DEBUG"])
        .install()
        .unwrap();

    io::stderr().write_all(b"raw stderr write\n").unwrap();
    let mut stdout = io::stdout();
    stdout.write_all(b"raw stdout write\n").unwrap();
    stdout.flush().unwrap();
    log::debug!(target: "rebind_check", "record through the logger");
    log::debug!(target: "rebind_check_sibling", "sibling stays at INFO");
    log::logger().flush();

    let contents = fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("raw stderr write"), "log was: {}", contents);
    assert!(contents.contains("raw stdout write"), "log was: {}", contents);
    assert!(contents.contains("DEBUG rebind_check] record through the logger"));
    assert!(!contents.contains("sibling stays at INFO"));
}
