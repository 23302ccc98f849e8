//! Claim expiry and recovery

use std::thread::sleep;
use std::time::Duration;

use crate::common::{broker_with_queue, in_flight_files, pending_files};
use ddmq::broker::{Broker, CallOptions};
use ddmq::queue::Settings;
use tempfile::TempDir;

#[test]
fn test_expired_claim_is_requeued_with_counter() {
    let settings = Settings::new()
        .with_message_timeout(30)
        .with_requeue(true)
        .with_requeue_prio(0);
    let (dir, clock, broker) = broker_with_queue("jobs", &settings);
    let options = CallOptions::default();

    let published = broker.publish("jobs", "x", &options).unwrap();
    broker.consume("jobs", 1, &options).unwrap();

    clock.advance(30);
    assert_eq!(broker.clean("jobs").unwrap().recovered(), 0);

    clock.advance(1);
    let report = broker.clean("jobs").unwrap();
    assert_eq!(report.requeued, 1);
    assert!(in_flight_files(dir.path(), "jobs").is_empty());
    assert_eq!(pending_files(dir.path(), "jobs").len(), 1);

    let again = broker.consume("jobs", 1, &options).unwrap().pop().unwrap();
    assert_eq!(again.message.id, published.id);
    assert_eq!(again.message.requeue_counter, 1);
    assert_eq!(again.message.priority, 0);
    assert!(again.message.sequence > published.sequence);
}

#[test]
fn test_requeue_limit_drops_after_cap() {
    let settings = Settings::new()
        .with_message_timeout(10)
        .with_requeue(true)
        .with_requeue_limit(Some(1));
    let (dir, clock, broker) = broker_with_queue("jobs", &settings);
    let skip = CallOptions::default().skip_cleaning(true);

    broker.publish("jobs", "x", &skip).unwrap();
    broker.consume("jobs", 1, &skip).unwrap();
    clock.advance(11);
    assert_eq!(broker.clean("jobs").unwrap().requeued, 1);

    broker.consume("jobs", 1, &skip).unwrap();
    clock.advance(11);
    let report = broker.clean("jobs").unwrap();
    assert_eq!((report.requeued, report.dropped), (0, 1));
    assert!(pending_files(dir.path(), "jobs").is_empty());
    assert!(in_flight_files(dir.path(), "jobs").is_empty());
}

#[test]
fn test_real_one_second_timeout() {
    let dir = TempDir::new().unwrap();
    let broker = Broker::open_or_init(dir.path()).unwrap();
    broker
        .create_queue(
            "slow",
            &Settings::new()
                .with_message_timeout(1)
                .with_requeue(true)
                .with_requeue_limit(Some(0)),
        )
        .unwrap();

    broker.publish("slow", "x", &CallOptions::default()).unwrap();
    assert_eq!(
        broker
            .consume("slow", 1, &CallOptions::default())
            .unwrap()
            .len(),
        1
    );

    sleep(Duration::from_secs(2));
    let report = broker.clean("slow").unwrap();
    assert_eq!(report.dropped, 1);
    assert!(broker
        .consume("slow", 1, &CallOptions::default())
        .unwrap()
        .is_empty());
}

#[test]
fn test_corrupt_in_flight_file_is_left_in_place() {
    let (dir, clock, broker) = broker_with_queue("jobs", &Settings::new().with_message_timeout(5));
    broker.publish("jobs", "x", &CallOptions::default()).unwrap();
    let delivery = broker
        .consume("jobs", 1, &CallOptions::default())
        .unwrap()
        .pop()
        .unwrap();
    let path = dir.path().join("jobs/work").join(delivery.handle.file_name());
    std::fs::write(&path, b"{ not json").unwrap();

    clock.advance(60);
    let report = broker.clean("jobs").unwrap();
    assert_eq!(report.corrupt, 1);
    assert!(path.exists());
}
