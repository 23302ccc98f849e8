//! Configuration file handling

use crate::common::{ddmq, stderr, stdout};
use tempfile::TempDir;

#[test]
fn test_format_from_config_file() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("root");
    let root = root.to_str().unwrap();
    let config = dir.path().join("ddmq.toml");
    std::fs::write(&config, "format = \"json\"\ncolor = false\n").unwrap();
    let config = config.to_str().unwrap();

    ddmq(&["create", root, "jobs", "-f", "-s"]);
    let out = ddmq(&["-c", config, "view", root]);
    let value: serde_json::Value = serde_json::from_str(stdout(&out).trim()).unwrap();
    assert_eq!(value[0]["name"], "jobs");

    // the command line still wins
    let out = ddmq(&["-c", config, "view", root, "-n", "--format", "plain"]);
    assert_eq!(stdout(&out).trim(), "jobs");
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    let out = ddmq(&[
        "--config-file",
        missing.to_str().unwrap(),
        "view",
        dir.path().to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("nope.toml"));
}

#[test]
fn test_log_file_from_config() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("ddmq.log");
    let config = dir.path().join("ddmq.toml");
    std::fs::write(
        &config,
        format!("log-level = \"info\"\nlog-file = \"{}\"\n", log.display()),
    )
    .unwrap();

    let root = dir.path().join("root");
    let out = ddmq(&[
        "-c",
        config.to_str().unwrap(),
        "create",
        root.to_str().unwrap(),
        "jobs",
        "-f",
    ]);
    assert!(out.status.success());
    let logged = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .any(|name| name.starts_with("ddmq") && name.ends_with(".log"));
    assert!(logged);
}
