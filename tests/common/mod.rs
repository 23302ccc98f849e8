//! Common test utilities and helpers
//!
//! Temporary roots, brokers on a controllable clock and a runner for the
//! built binary.

#![allow(dead_code)]

use std::path::Path;
use std::process::Output;
use std::sync::Arc;

use ddmq::broker::Broker;
use ddmq::core::time::ManualClock;
use ddmq::queue::Settings;
use tempfile::TempDir;

pub const START: i64 = 1_700_000_000;

/// A fresh root with one queue, on a manual clock
pub fn broker_with_queue(queue: &str, settings: &Settings) -> (TempDir, ManualClock, Broker) {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new(START);
    let broker = Broker::open_or_init(dir.path())
        .unwrap()
        .with_clock(Arc::new(clock.clone()));
    broker.create_queue(queue, settings).unwrap();
    (dir, clock, broker)
}

/// Names of the pending message files of a queue, in directory order
pub fn pending_files(root: &Path, queue: &str) -> Vec<String> {
    message_files(&root.join(queue))
}

/// Names of the in-flight message files of a queue
pub fn in_flight_files(root: &Path, queue: &str) -> Vec<String> {
    message_files(&root.join(queue).join("work"))
}

fn message_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.contains(".ddmq"))
        .collect();
    names.sort();
    names
}

/// Run the ddmq binary with an isolated config directory
pub fn ddmq(args: &[&str]) -> Output {
    let config_home = TempDir::new().unwrap();
    std::process::Command::new(env!("CARGO_BIN_EXE_ddmq"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .output()
        .unwrap()
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
