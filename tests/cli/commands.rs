//! Queue commands through the binary

use crate::common::{ddmq, stdout};
use tempfile::TempDir;

#[test]
fn test_round_trip_through_binary() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_str().unwrap();

    let out = ddmq(&["create", root, "jobs", "-f"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("Created new queue: jobs"));

    let out = ddmq(&["publish", root, "jobs", "hello from the shell", "-p", "3"]);
    assert!(out.status.success(), "{:?}", out);

    let out = ddmq(&["consume", root, "jobs"]);
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_str(stdout(&out).trim()).unwrap();
    assert_eq!(value["payload"], "hello from the shell");
    assert_eq!(value["priority"], 3);
    let handle = value["handle"].as_str().unwrap().to_string();

    let out = ddmq(&["ack", root, "jobs", &handle]);
    assert!(out.status.success());
    assert!(stdout(&out).starts_with("acked "));

    let out = ddmq(&["ack", root, "jobs", &handle]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stdout(&out).starts_with("failed ack "));
}

#[test]
fn test_view_json_and_names() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_str().unwrap();
    ddmq(&["create", root, "b,a", "-f", "-s"]);
    ddmq(&["publish", root, "a", "x"]);

    let out = ddmq(&["view", root, "--format", "json"]);
    let value: serde_json::Value = serde_json::from_str(stdout(&out).trim()).unwrap();
    assert_eq!(value[0]["name"], "a");
    assert_eq!(value[0]["pending"], 1);
    assert_eq!(value[1]["name"], "b");

    let out = ddmq(&["view", root, "-n", "--no-color"]);
    assert_eq!(stdout(&out).trim(), "a\nb");
}

#[test]
fn test_consume_yaml_and_count() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_str().unwrap();
    for payload in ["one", "two", "three"] {
        ddmq(&["publish", root, "jobs", payload, "-f"]);
    }

    let out = ddmq(&["consume", root, "jobs", "-n", "2", "--format", "yaml"]);
    let text = stdout(&out);
    assert_eq!(text.matches("---").count(), 2, "{}", text);
    assert!(text.contains("payload: one"));
    assert!(text.contains("payload: two"));
}

#[test]
fn test_json_command() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_str().unwrap();
    let publish = serde_json::json!({
        "cmd": "publish", "root": root, "queue": "jobs", "message": "via json", "f": true
    })
    .to_string();
    assert!(ddmq(&["json", &publish]).status.success());

    let consume =
        serde_json::json!({"cmd": "consume", "root": root, "queue": "jobs", "format": "plain"})
            .to_string();
    let out = ddmq(&["json", &consume]);
    assert!(stdout(&out).trim_end().ends_with("\tvia json"));
}
