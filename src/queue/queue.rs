use crate::queue::envelope::{Delivery, JobEnvelope};
use crate::queue::error::QueueError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// JobQueue trait defining the durable at-least-once work queue.
///
/// A popped envelope stays invisible to other consumers for the queue's
/// visibility timeout; a consumer that never acks leaves it to reappear.
/// FIFO order under contention is not promised.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Enqueue an envelope. Fails with `Backpressure` when the queue depth is
    /// at or above the configured maximum, `Unavailable` when the backing
    /// store is unreachable.
    async fn push(&self, envelope: &JobEnvelope) -> Result<i64, QueueError>;

    /// Block up to `timeout` for the next envelope; `Ok(None)` on timeout.
    /// The returned envelope becomes invisible for the visibility timeout.
    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Permanently remove a delivered envelope
    async fn ack(&self, delivery_id: i64) -> Result<(), QueueError>;

    /// Return a delivered envelope to the queue immediately, bumping its
    /// attempt counter
    async fn nack(&self, delivery_id: i64, reason: &str) -> Result<(), QueueError>;

    /// Return a delivered envelope to the queue after `delay`, bumping its
    /// attempt counter (retry backoff)
    async fn nack_delayed(
        &self,
        delivery_id: i64,
        reason: &str,
        delay: Duration,
    ) -> Result<(), QueueError>;

    /// Best-effort queue depth
    async fn depth(&self) -> Result<i64, QueueError>;
}

/// Implementation of JobQueue trait for Arc<T> where T implements JobQueue
#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn push(&self, envelope: &JobEnvelope) -> Result<i64, QueueError> {
        (**self).push(envelope).await
    }

    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        (**self).blocking_pop(timeout).await
    }

    async fn ack(&self, delivery_id: i64) -> Result<(), QueueError> {
        (**self).ack(delivery_id).await
    }

    async fn nack(&self, delivery_id: i64, reason: &str) -> Result<(), QueueError> {
        (**self).nack(delivery_id, reason).await
    }

    async fn nack_delayed(
        &self,
        delivery_id: i64,
        reason: &str,
        delay: Duration,
    ) -> Result<(), QueueError> {
        (**self).nack_delayed(delivery_id, reason, delay).await
    }

    async fn depth(&self) -> Result<i64, QueueError> {
        (**self).depth().await
    }
}
