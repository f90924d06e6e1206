#![cfg(feature = "cli")]

use std::io::Write;
use std::process::{Command, Stdio};

fn beam() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_beam"));
    cmd.arg("--log-level").arg("error");
    cmd
}

#[test]
fn loopback_copies_stdin_to_stdout() {
    let mut child = beam()
        .arg("--format")
        .arg("json")
        .arg("loopback")
        .arg("--name")
        .arg("logs")
        .arg("--poll-ms")
        .arg("10")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("loopback should start");

    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(b"hello\nworld\n")
        .expect("stdin should accept input");

    let output = child.wait_with_output().expect("loopback should finish");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"hello\nworld\n");

    let stderr = String::from_utf8_lossy(&output.stderr);
    let report: serde_json::Value = serde_json::from_str(stderr.trim())
        .expect("loopback should report json on stderr");
    assert_eq!(report["stream"], "logs");
    assert_eq!(report["bytes_written"], 12);
    assert_eq!(report["bytes_read"], 12);
    assert_eq!(report["cancelled"], false);
}

#[test]
fn loopback_with_empty_stdin_reaches_eof() {
    let output = beam()
        .arg("--format")
        .arg("raw")
        .arg("loopback")
        .arg("--name")
        .arg("empty")
        .stdin(Stdio::null())
        .output()
        .expect("loopback should run");

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn loopback_without_name_is_usage_error() {
    let output = beam()
        .arg("loopback")
        .output()
        .expect("loopback should run");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn doctor_passes_on_clean_env() {
    let output = beam()
        .arg("--format")
        .arg("json")
        .arg("doctor")
        .output()
        .expect("doctor should run");

    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("doctor should emit json");
    assert_eq!(payload["overall"], "pass");
    let names: Vec<&str> = payload["checks"]
        .as_array()
        .expect("checks should be an array")
        .iter()
        .filter_map(|check| check["name"].as_str())
        .collect();
    assert!(names.contains(&"ordered_close_all"));
}

#[test]
fn version_reports_package_version() {
    let output = beam().arg("version").output().expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("beam {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn extended_version_lists_frame_format() {
    let output = beam()
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: beam"));
    assert!(stdout.contains("profile: "));
    assert!(stdout.contains("frame: magic=BM header=9B"));
}
