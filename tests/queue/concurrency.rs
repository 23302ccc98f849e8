//! Many independent clients on one queue
//!
//! Each task opens its own broker, as separate processes would.

use std::collections::HashSet;
use std::path::PathBuf;

use ddmq::broker::{Broker, CallOptions};
use ddmq::queue::Settings;
use tempfile::TempDir;
use tokio::task::JoinSet;

fn root_with_queue() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let broker = Broker::open_or_init(dir.path()).unwrap();
    broker.create_queue("jobs", &Settings::new()).unwrap();
    let root = dir.path().to_path_buf();
    (dir, root)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_each_message_has_one_consumer() {
    const MESSAGES: usize = 60;
    const CONSUMERS: usize = 12;

    let (_dir, root) = root_with_queue();
    let broker = Broker::open(&root).unwrap();
    for i in 0..MESSAGES {
        broker
            .publish("jobs", &format!("message-{}", i), &CallOptions::default())
            .unwrap();
    }

    let mut tasks = JoinSet::new();
    for _ in 0..CONSUMERS {
        let root = root.clone();
        tasks.spawn_blocking(move || {
            let broker = Broker::open(&root).unwrap();
            let options = CallOptions::default().skip_cleaning(true);
            let mut ids = Vec::new();
            loop {
                let deliveries = broker.consume("jobs", 1, &options).unwrap();
                if deliveries.is_empty() {
                    break;
                }
                for delivery in deliveries {
                    assert!(broker.ack("jobs", &delivery.handle).unwrap());
                    ids.push(delivery.message.id);
                }
            }
            ids
        });
    }

    let mut seen = HashSet::new();
    while let Some(result) = tasks.join_next().await {
        for id in result.unwrap() {
            assert!(seen.insert(id.clone()), "message {} delivered twice", id);
        }
    }
    assert_eq!(seen.len(), MESSAGES);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_publishers_get_unique_sequences() {
    const PUBLISHERS: usize = 8;
    const PER_PUBLISHER: usize = 25;

    let (_dir, root) = root_with_queue();

    let mut tasks = JoinSet::new();
    for p in 0..PUBLISHERS {
        let root = root.clone();
        tasks.spawn_blocking(move || {
            let broker = Broker::open(&root).unwrap();
            let options = CallOptions::default().skip_cleaning(true);
            (0..PER_PUBLISHER)
                .map(|i| {
                    broker
                        .publish("jobs", &format!("{}-{}", p, i), &options)
                        .unwrap()
                        .sequence
                })
                .collect::<Vec<u64>>()
        });
    }

    let mut sequences = HashSet::new();
    while let Some(result) = tasks.join_next().await {
        for sequence in result.unwrap() {
            assert!(sequences.insert(sequence), "sequence {} reused", sequence);
        }
    }
    assert_eq!(sequences.len(), PUBLISHERS * PER_PUBLISHER);

    let broker = Broker::open(&root).unwrap();
    assert_eq!(broker.view(&[]).unwrap()[0].pending, PUBLISHERS * PER_PUBLISHER);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cleaners_recover_once() {
    let (_dir, root) = root_with_queue();
    let broker = Broker::open(&root).unwrap();
    broker
        .update_queue_settings(
            "jobs",
            &Settings::new().with_message_timeout(1).with_requeue(true),
        )
        .unwrap();
    for i in 0..10 {
        broker
            .publish("jobs", &i.to_string(), &CallOptions::default())
            .unwrap();
    }
    broker.consume("jobs", 10, &CallOptions::default()).unwrap();
    std::thread::sleep(std::time::Duration::from_secs(2));

    let mut tasks = JoinSet::new();
    for _ in 0..4 {
        let root = root.clone();
        tasks.spawn_blocking(move || Broker::open(&root).unwrap().clean("jobs").unwrap());
    }
    let mut requeued = 0;
    while let Some(result) = tasks.join_next().await {
        requeued += result.unwrap().requeued;
    }
    assert_eq!(requeued, 10);

    let counts = broker.view(&[]).unwrap();
    assert_eq!((counts[0].pending, counts[0].in_flight), (10, 0));
}
