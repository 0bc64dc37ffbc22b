use crate::queue::envelope::{Delivery, JobEnvelope};
use crate::queue::error::QueueError;
use crate::queue::queue::JobQueue;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Inner {
    next_id: i64,
    ready: VecDeque<(i64, JobEnvelope)>,
    in_flight: HashMap<i64, JobEnvelope>,
    push_count: u64,
    fail_pushes: u32,
    nack_delays: Vec<Duration>,
}

/// `FakeJobQueue` is an in-memory implementation of the `JobQueue` trait for
/// testing. Visibility is manual: popped envelopes sit in flight until acked,
/// nacked, or force-expired with `fake_expire_visibility` (standing in for a
/// crashed worker whose visibility window lapsed).
#[derive(Clone)]
pub struct FakeJobQueue {
    inner: Arc<Mutex<Inner>>,
    max_queue_size: i64,
}

#[allow(dead_code)]
impl FakeJobQueue {
    pub fn new() -> Self {
        Self::with_max_size(1000)
    }

    pub fn with_max_size(max_queue_size: i64) -> Self {
        FakeJobQueue {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                ready: VecDeque::new(),
                in_flight: HashMap::new(),
                push_count: 0,
                fail_pushes: 0,
                nack_delays: Vec::new(),
            })),
            max_queue_size,
        }
    }

    /// Total number of pushes observed (queue-side instrumentation)
    pub async fn push_count(&self) -> u64 {
        self.inner.lock().await.push_count
    }

    /// Fail the next `count` pushes with `Unavailable`
    pub async fn fake_fail_pushes(&self, count: u32) {
        self.inner.lock().await.fail_pushes = count;
    }

    /// Move every in-flight envelope back to the ready queue, as if its
    /// visibility timeout elapsed without an ack
    pub async fn fake_expire_visibility(&self) {
        let mut inner = self.inner.lock().await;
        let expired: Vec<(i64, JobEnvelope)> = inner.in_flight.drain().collect();
        for entry in expired {
            inner.ready.push_back(entry);
        }
    }

    /// Delays recorded by `nack_delayed`, for backoff assertions
    pub async fn nack_delays(&self) -> Vec<Duration> {
        self.inner.lock().await.nack_delays.clone()
    }

    /// Number of envelopes currently invisible (popped, not yet acked)
    pub async fn in_flight_count(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }
}

impl Default for FakeJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for FakeJobQueue {
    async fn push(&self, envelope: &JobEnvelope) -> Result<i64, QueueError> {
        let mut inner = self.inner.lock().await;

        if inner.fail_pushes > 0 {
            inner.fail_pushes -= 1;
            return Err(QueueError::Unavailable("injected push failure".to_string()));
        }

        let depth = (inner.ready.len() + inner.in_flight.len()) as i64;
        if depth >= self.max_queue_size {
            return Err(QueueError::Backpressure {
                depth,
                max: self.max_queue_size,
            });
        }

        inner.next_id += 1;
        inner.push_count += 1;
        let delivery_id = inner.next_id;
        inner.ready.push_back((delivery_id, envelope.clone()));
        Ok(delivery_id)
    }

    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some((delivery_id, envelope)) = inner.ready.pop_front() {
                    inner.in_flight.insert(delivery_id, envelope.clone());
                    return Ok(Some(Delivery {
                        delivery_id,
                        envelope,
                    }));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn ack(&self, delivery_id: i64) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&delivery_id);
        Ok(())
    }

    async fn nack(&self, delivery_id: i64, reason: &str) -> Result<(), QueueError> {
        self.nack_delayed(delivery_id, reason, Duration::ZERO).await
    }

    async fn nack_delayed(
        &self,
        delivery_id: i64,
        _reason: &str,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().await;
        inner.nack_delays.push(delay);

        if let Some(mut envelope) = inner.in_flight.remove(&delivery_id) {
            envelope.attempts += 1;
            // Delays are recorded but not simulated so tests run fast
            inner.ready.push_back((delivery_id, envelope));
        }
        Ok(())
    }

    async fn depth(&self) -> Result<i64, QueueError> {
        let inner = self.inner.lock().await;
        Ok((inner.ready.len() + inner.in_flight.len()) as i64)
    }
}
