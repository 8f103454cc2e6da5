//! Broker behaviour tests.

use serde_json::json;
use std::time::Duration;

use super::{EnqueueOpts, QueueBroker, QueueName};

fn broker() -> QueueBroker {
    QueueBroker::new(Duration::from_secs(300))
}

#[tokio::test]
async fn enqueue_claim_ack_roundtrip() {
    let b = broker();
    b.enqueue(
        QueueName::Geocode,
        7,
        json!({"jobId": 7}),
        EnqueueOpts::default(),
    )
    .unwrap();

    let claimed = b
        .claim(QueueName::Geocode, "w1", Duration::from_millis(100))
        .await
        .expect("unit available");
    assert_eq!(claimed.job_key, 7);
    assert_eq!(claimed.payload, json!({"jobId": 7}));

    let counts = b.job_counts(QueueName::Geocode);
    assert_eq!(counts.waiting, 0);
    assert_eq!(counts.active, 1);

    b.ack(claimed.release);
    let counts = b.job_counts(QueueName::Geocode);
    assert_eq!(counts.active, 0);
    assert_eq!(counts.completed, 1);
}

#[tokio::test]
async fn claim_times_out_on_empty_queue() {
    let b = broker();
    let got = b
        .claim(QueueName::Scheduled, "w1", Duration::from_millis(20))
        .await;
    assert!(got.is_none());
}

#[tokio::test]
async fn duplicate_job_key_is_deduped() {
    let b = broker();
    b.enqueue(QueueName::VoterImport, 1, json!({}), EnqueueOpts::default())
        .unwrap();
    b.enqueue(QueueName::VoterImport, 1, json!({}), EnqueueOpts::default())
        .unwrap();
    assert_eq!(b.job_counts(QueueName::VoterImport).waiting, 1);
}

#[tokio::test]
async fn delayed_unit_not_claimable_until_due() {
    let b = broker();
    b.enqueue(
        QueueName::Geocode,
        3,
        json!({}),
        EnqueueOpts {
            delay: Some(Duration::from_millis(80)),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(b.job_counts(QueueName::Geocode).delayed, 1);

    let early = b
        .claim(QueueName::Geocode, "w1", Duration::from_millis(20))
        .await;
    assert!(early.is_none());

    let later = b
        .claim(QueueName::Geocode, "w1", Duration::from_millis(500))
        .await;
    assert_eq!(later.unwrap().job_key, 3);
}

#[tokio::test]
async fn remove_evicts_waiting_and_delayed_units() {
    let b = broker();
    b.enqueue(QueueName::Geocode, 1, json!({}), EnqueueOpts::default())
        .unwrap();
    b.enqueue(
        QueueName::Geocode,
        2,
        json!({}),
        EnqueueOpts {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        },
    )
    .unwrap();

    assert!(b.remove(QueueName::Geocode, 1));
    assert!(b.remove(QueueName::Geocode, 2));
    assert!(!b.remove(QueueName::Geocode, 3));

    let counts = b.job_counts(QueueName::Geocode);
    assert_eq!(counts.waiting, 0);
    assert_eq!(counts.delayed, 0);
}

#[tokio::test]
async fn nack_requeues_with_backoff_until_budget_exhausted() {
    let b = broker();
    b.enqueue(
        QueueName::VoterImport,
        5,
        json!({}),
        EnqueueOpts {
            delay: None,
            max_attempts: 2,
        },
    )
    .unwrap();

    let c1 = b
        .claim(QueueName::VoterImport, "w1", Duration::from_millis(100))
        .await
        .unwrap();
    b.nack(c1.release, true);
    // First nack: redelivered after backoff.
    let c2 = b
        .claim(QueueName::VoterImport, "w1", Duration::from_secs(2))
        .await
        .expect("redelivered");
    assert_eq!(c2.job_key, 5);

    // Second nack exhausts the budget.
    b.nack(c2.release, true);
    let counts = b.job_counts(QueueName::VoterImport);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.waiting + counts.delayed, 0);
}

#[tokio::test]
async fn nack_without_requeue_drops_immediately() {
    let b = broker();
    b.enqueue(QueueName::Scheduled, 9, json!({}), EnqueueOpts::default())
        .unwrap();
    let c = b
        .claim(QueueName::Scheduled, "w1", Duration::from_millis(100))
        .await
        .unwrap();
    b.nack(c.release, false);
    assert_eq!(b.job_counts(QueueName::Scheduled).failed, 1);
}

#[tokio::test]
async fn expired_claim_is_redelivered() {
    let b = QueueBroker::new(Duration::from_millis(30));
    b.enqueue(QueueName::Geocode, 11, json!({}), EnqueueOpts::default())
        .unwrap();

    let first = b
        .claim(QueueName::Geocode, "w1", Duration::from_millis(100))
        .await
        .unwrap();
    // Simulate a dead worker: never ack, wait out the visibility timeout.
    tokio::time::sleep(Duration::from_millis(60)).await;

    let second = b
        .claim(QueueName::Geocode, "w2", Duration::from_millis(500))
        .await
        .expect("redelivered after visibility timeout");
    assert_eq!(second.job_key, 11);

    // The stale token no longer counts a completion.
    b.ack(first.release);
    assert_eq!(b.job_counts(QueueName::Geocode).completed, 0);
}

#[tokio::test]
async fn paused_queue_withholds_units() {
    let b = broker();
    b.enqueue(QueueName::Geocode, 4, json!({}), EnqueueOpts::default())
        .unwrap();
    b.pause_queue(QueueName::Geocode);

    let counts = b.job_counts(QueueName::Geocode);
    assert_eq!(counts.waiting, 0);
    assert_eq!(counts.paused, 1);

    let got = b
        .claim(QueueName::Geocode, "w1", Duration::from_millis(20))
        .await;
    assert!(got.is_none());

    b.resume_queue(QueueName::Geocode);
    let got = b
        .claim(QueueName::Geocode, "w1", Duration::from_millis(200))
        .await;
    assert_eq!(got.unwrap().job_key, 4);
}

#[tokio::test]
async fn concurrent_claims_never_hand_out_the_same_unit() {
    let b = std::sync::Arc::new(broker());
    for key in 0..20 {
        b.enqueue(QueueName::Geocode, key, json!({}), EnqueueOpts::default())
            .unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..4 {
        let b = std::sync::Arc::clone(&b);
        handles.push(tokio::spawn(async move {
            let mut got = Vec::new();
            loop {
                match b
                    .claim(QueueName::Geocode, &format!("w{w}"), Duration::from_millis(50))
                    .await
                {
                    Some(c) => {
                        got.push(c.job_key);
                        b.ack(c.release);
                    }
                    None => break,
                }
            }
            got
        }));
    }

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    all.sort_unstable();
    let expected: Vec<i64> = (0..20).collect();
    assert_eq!(all, expected);
}
