//! Exit status and error reporting

use crate::common::{ddmq, stderr};
use tempfile::TempDir;

#[test]
fn test_uninitialised_root_is_fatal() {
    let dir = TempDir::new().unwrap();
    let out = ddmq(&["publish", dir.path().to_str().unwrap(), "jobs", "x"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("FATAL: Root directory not initialised"), "{}", stderr(&out));
}

#[test]
fn test_missing_queue_is_fatal() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_str().unwrap();
    ddmq(&["create", root, "jobs", "-f"]);

    let out = ddmq(&["consume", root, "nope"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("FATAL: Queue not found: nope"));
}

#[test]
fn test_usage_errors_exit_with_clap_status() {
    let out = ddmq(&["publish"]);
    assert_eq!(out.status.code(), Some(2));

    let out = ddmq(&["fly", "/tmp"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_bad_json_payload() {
    let out = ddmq(&["json", "{not json"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("FATAL: Invalid JSON command"));
}
