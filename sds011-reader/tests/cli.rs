// SDS011 Reader - Process level tests
//
// These run the built binary; none of them needs a sensor attached.

use std::process::{Command, Output};

fn reader(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sds011-reader"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run sds011-reader")
}

#[test]
fn test_missing_device_exits_without_output() {
    let output = reader(&["--port-path", "/dev/sds011-does-not-exist"]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/dev/sds011-does-not-exist"), "stderr: {stderr}");
}

#[test]
fn test_missing_device_with_metrics_enabled() {
    let output = reader(&[
        "--port-path",
        "/dev/sds011-does-not-exist",
        "--listen-address",
        "127.0.0.1:0",
    ]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_invalid_flags_fail_before_startup() {
    let output = reader(&["--samples", "0"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());

    let output = reader(&["--interval", "forever"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_help_mentions_csv_columns() {
    let output = reader(&["--help"]);
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    assert!(help.contains("--port-path"));
    assert!(help.contains("--listen-address"));
    assert!(help.contains("PM2.5"));
}
