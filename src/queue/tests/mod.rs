//! Test modules for the queue engine
//!
//! Tests are organized by lifecycle stage. All of them run against a
//! throwaway directory and a manual clock.


use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use crate::core::time::ManualClock;
use crate::queue::config::EffectiveConfig;
use crate::queue::engine::QueueEngine;
use crate::queue::store::DirectoryStore;

pub(crate) const START: i64 = 1_700_000_000;

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub clock: ManualClock,
    pub engine: QueueEngine,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let queue_dir = dir.path().join("jobs");
        fs::create_dir_all(queue_dir.join("work")).unwrap();
        fs::write(queue_dir.join("ddmq.yaml"), b"").unwrap();
        let clock = ManualClock::new(START);
        let engine = QueueEngine::open(
            "jobs",
            &queue_dir,
            DirectoryStore::new(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        Self { dir, clock, engine }
    }

    pub fn publish(&self, payload: &str, config: &EffectiveConfig) -> String {
        self.engine.publish(payload, config).unwrap().id
    }

    pub fn pending_names(&self) -> Vec<String> {
        visible_files(self.engine.dir())
    }

    pub fn in_flight_names(&self) -> Vec<String> {
        visible_files(self.engine.work_dir())
    }
}

pub(crate) fn with_priority(priority: u32) -> EffectiveConfig {
    EffectiveConfig {
        default_priority: priority,
        ..EffectiveConfig::default()
    }
}

fn visible_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = DirectoryStore::new()
        .list(dir)
        .unwrap()
        .into_iter()
        .filter(|n| !n.starts_with('.') && n != "ddmq.yaml")
        .collect();
    names.sort();
    names
}
