//! Nack policies and call overrides

use crate::common::{broker_with_queue, pending_files};
use ddmq::broker::CallOptions;
use ddmq::queue::{NackOutcome, Settings};

#[test]
fn test_nack_requeues_to_front_with_requeue_prio() {
    let settings = Settings::new().with_requeue(true).with_requeue_prio(0);
    let (dir, _clock, broker) = broker_with_queue("jobs", &settings);
    let options = CallOptions::default();

    let first = broker.publish("jobs", "first", &options).unwrap();
    broker.publish("jobs", "second", &options).unwrap();
    let delivery = broker.consume("jobs", 1, &options).unwrap().pop().unwrap();
    assert_eq!(delivery.message.id, first.id);

    let outcome = broker
        .nack("jobs", &delivery.handle, &Settings::new())
        .unwrap();
    let NackOutcome::Requeued(name) = outcome else {
        panic!("expected requeue, got {:?}", outcome);
    };
    assert_eq!(name.priority, 0);
    assert!(pending_files(dir.path(), "jobs").contains(&name.to_string()));

    let next = broker.consume("jobs", 1, &options).unwrap().pop().unwrap();
    assert_eq!(next.message.payload, "first");
    assert_eq!(next.message.requeue_counter, 1);
}

#[test]
fn test_nack_override_forces_requeue() {
    let (_dir, _clock, broker) = broker_with_queue("jobs", &Settings::new());
    broker.publish("jobs", "x", &CallOptions::default()).unwrap();
    let delivery = broker
        .consume("jobs", 1, &CallOptions::default())
        .unwrap()
        .pop()
        .unwrap();

    let outcome = broker
        .nack("jobs", &delivery.handle, &Settings::new().with_requeue(true))
        .unwrap();
    assert!(matches!(outcome, NackOutcome::Requeued(_)));
}

#[test]
fn test_nack_of_vanished_claim() {
    let (_dir, _clock, broker) = broker_with_queue("jobs", &Settings::new().with_requeue(true));
    broker.publish("jobs", "x", &CallOptions::default()).unwrap();
    let delivery = broker
        .consume("jobs", 1, &CallOptions::default())
        .unwrap()
        .pop()
        .unwrap();
    broker.ack("jobs", &delivery.handle).unwrap();

    let outcome = broker
        .nack("jobs", &delivery.handle, &Settings::new())
        .unwrap();
    assert_eq!(outcome, NackOutcome::Vanished);
}

#[test]
fn test_requeue_limit_zero_drops_on_first_nack() {
    let settings = Settings::new()
        .with_requeue(true)
        .with_requeue_limit(Some(0));
    let (_dir, _clock, broker) = broker_with_queue("jobs", &settings);
    broker.publish("jobs", "x", &CallOptions::default()).unwrap();
    let delivery = broker
        .consume("jobs", 1, &CallOptions::default())
        .unwrap()
        .pop()
        .unwrap();

    let outcome = broker
        .nack("jobs", &delivery.handle, &Settings::new())
        .unwrap();
    assert_eq!(outcome, NackOutcome::Dropped);
}
