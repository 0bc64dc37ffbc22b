use crate::queue::envelope::{JobEnvelope, PayloadRef};
use crate::queue::error::QueueError;
use crate::queue::fake::FakeJobQueue;
use crate::queue::queue::JobQueue;
use std::time::Duration;
use uuid::Uuid;

fn envelope() -> JobEnvelope {
    JobEnvelope::new(
        Uuid::new_v4(),
        "car.jpg",
        "image/jpeg",
        PayloadRef::inline(vec![1, 2, 3]),
        1_700_000_000,
    )
}

#[tokio::test]
async fn push_pop_ack_removes_envelope() {
    let queue = FakeJobQueue::new();

    queue.push(&envelope()).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 1);

    let delivery = queue
        .blocking_pop(Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    queue.ack(delivery.delivery_id).await.unwrap();

    assert_eq!(queue.depth().await.unwrap(), 0);
    let next = queue.blocking_pop(Duration::from_millis(10)).await.unwrap();
    assert!(next.is_none());
}

#[tokio::test]
async fn pop_timeout_returns_none_not_error() {
    let queue = FakeJobQueue::new();

    let result = queue.blocking_pop(Duration::from_millis(10)).await.unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn popped_envelope_is_invisible_until_nacked() {
    let queue = FakeJobQueue::new();
    queue.push(&envelope()).await.unwrap();

    let delivery = queue
        .blocking_pop(Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();

    // Invisible to a second consumer while in flight
    let second = queue.blocking_pop(Duration::from_millis(10)).await.unwrap();
    assert!(second.is_none());

    queue.nack(delivery.delivery_id, "test").await.unwrap();

    let redelivered = queue
        .blocking_pop(Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(redelivered.envelope.job_id, delivery.envelope.job_id);
    assert_eq!(redelivered.envelope.attempts, delivery.envelope.attempts + 1);
}

#[tokio::test]
async fn unacked_envelope_reappears_after_visibility_expiry() {
    let queue = FakeJobQueue::new();
    let pushed = envelope();
    queue.push(&pushed).await.unwrap();

    // Consumer pops and "crashes" without acking
    let _delivery = queue
        .blocking_pop(Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(queue.in_flight_count().await, 1);

    queue.fake_expire_visibility().await;

    let redelivered = queue
        .blocking_pop(Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(redelivered.envelope.job_id, pushed.job_id);
}

#[tokio::test]
async fn push_at_max_depth_fails_with_backpressure() {
    let queue = FakeJobQueue::with_max_size(2);

    queue.push(&envelope()).await.unwrap();
    queue.push(&envelope()).await.unwrap();

    let err = queue.push(&envelope()).await.unwrap_err();
    assert!(matches!(err, QueueError::Backpressure { depth: 2, max: 2 }));
    assert_eq!(queue.depth().await.unwrap(), 2);
}

#[tokio::test]
async fn envelope_survives_serde_round_trip() {
    let original = JobEnvelope::new(
        Uuid::new_v4(),
        "big.png",
        "image/png",
        PayloadRef::staged("staging/abc"),
        1_700_000_000,
    );

    let json = serde_json::to_value(&original).unwrap();
    let decoded: JobEnvelope = serde_json::from_value(json).unwrap();

    assert_eq!(decoded, original);
}
