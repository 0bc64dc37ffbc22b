use crate::db::{MetadataError, MetadataStore};
use crate::model::{ModelError, ModelManager};
use crate::pipeline::retry::worker_backoff_delay;
use crate::pipeline::stats::StatsAggregator;
use crate::queue::{Delivery, JobQueue, PayloadRef};
use crate::s3::{keys, BlobStore, StorageError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How a processing step failed: transient failures are retried through the
/// queue, fatal ones terminate the job.
enum StepFailure {
    Transient {
        kind: &'static str,
        detail: String,
    },
    Fatal {
        kind: &'static str,
        detail: String,
    },
}

impl StepFailure {
    fn timeout() -> Self {
        StepFailure::Transient {
            kind: "timeout",
            detail: "per-step deadline exceeded".to_string(),
        }
    }
}

impl From<StorageError> for StepFailure {
    fn from(e: StorageError) -> Self {
        match e {
            // A payload that is gone will not come back with retries
            StorageError::ObjectNotFound(key) => StepFailure::Fatal {
                kind: "payload-missing",
                detail: format!("payload object not found: {}", key),
            },
            other => StepFailure::Transient {
                kind: "storage-unavailable",
                detail: other.to_string(),
            },
        }
    }
}

impl From<ModelError> for StepFailure {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Decode(detail) => StepFailure::Fatal {
                kind: "decode",
                detail,
            },
            other => StepFailure::Fatal {
                kind: "model",
                detail: other.to_string(),
            },
        }
    }
}

impl From<MetadataError> for StepFailure {
    fn from(e: MetadataError) -> Self {
        match e {
            // Impossible per the admission invariants; kept as a fatal
            // diagnostic rather than being retried forever
            MetadataError::Duplicate(detail) | MetadataError::NotFound(detail) => {
                StepFailure::Fatal {
                    kind: "internal",
                    detail,
                }
            }
            other => StepFailure::Transient {
                kind: "metadata-unavailable",
                detail: other.to_string(),
            },
        }
    }
}

/// Executes the per-job state machine for one delivered envelope.
///
/// Every path ends in exactly one of: ack (terminal outcome recorded) or
/// delayed nack (the envelope will be redelivered). The worker never
/// propagates errors to its loop.
pub struct Worker<Q, B, M> {
    queue: Arc<Q>,
    blobs: Arc<B>,
    metadata: Arc<M>,
    models: Arc<ModelManager>,
    stats: Arc<StatsAggregator>,
    worker_timeout: Duration,
    max_attempts: u32,
}

impl<Q: JobQueue, B: BlobStore, M: MetadataStore> Worker<Q, B, M> {
    pub fn new(
        queue: Arc<Q>,
        blobs: Arc<B>,
        metadata: Arc<M>,
        models: Arc<ModelManager>,
        stats: Arc<StatsAggregator>,
        worker_timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            queue,
            blobs,
            metadata,
            models,
            stats,
            worker_timeout,
            max_attempts,
        }
    }

    pub async fn process(&self, delivery: Delivery) {
        let job_id = delivery.envelope.job_id;
        let start = Instant::now();

        match self.run_steps(&delivery).await {
            // Dropped envelope (orphan or terminal row); already acked
            Ok(false) => {}
            Ok(true) => {
                let elapsed = start.elapsed().as_secs_f64();
                self.stats.record_completed(elapsed);
                if let Err(e) = self.queue.ack(delivery.delivery_id).await {
                    // The row is already terminal; redelivery will be dropped
                    // by the idempotence check
                    warn!("Failed to ack delivery for job {}: {}", job_id, e);
                }
            }
            Err(StepFailure::Fatal { kind, detail }) => {
                error!("Job {} failed fatally ({}): {}", job_id, kind, detail);
                self.fail_job(&delivery, kind, start.elapsed().as_secs_f64())
                    .await;
            }
            Err(StepFailure::Transient { kind, detail }) => {
                let attempts = delivery.envelope.attempts;
                if attempts + 1 >= self.max_attempts {
                    warn!(
                        "Job {} exhausted {} attempts, failing ({}): {}",
                        job_id, self.max_attempts, kind, detail
                    );
                    self.fail_job(&delivery, kind, start.elapsed().as_secs_f64())
                        .await;
                } else {
                    let delay = worker_backoff_delay(attempts);
                    info!(
                        "Job {} hit transient failure ({}), retrying in {:?} (attempt {}): {}",
                        job_id, kind, delay, attempts, detail
                    );
                    if let Err(e) = self
                        .queue
                        .nack_delayed(delivery.delivery_id, kind, delay)
                        .await
                    {
                        // Leave the delivery un-acked; the visibility timeout
                        // brings it back
                        warn!("Failed to nack delivery for job {}: {}", job_id, e);
                    }
                }
            }
        }
    }

    /// Runs steps 1-7 of the state machine. `Ok(true)` means the job was
    /// carried to completion; `Ok(false)` means the envelope was dropped
    /// (orphan or terminal row) and already acked.
    async fn run_steps(&self, delivery: &Delivery) -> Result<bool, StepFailure> {
        let envelope = &delivery.envelope;
        let job_id = envelope.job_id;

        let row = match self.metadata.get_by_job_id(job_id).await {
            Ok(row) => row,
            Err(e) => return Err(e.into()),
        };

        let Some(row) = row else {
            // Orphan envelope: no durable record ever existed for it
            warn!("Dropping orphan envelope for job {}", job_id);
            if let Err(e) = self.queue.ack(delivery.delivery_id).await {
                warn!("Failed to ack orphan delivery for job {}: {}", job_id, e);
            }
            return Ok(false);
        };

        if row.status.is_terminal() {
            debug!(
                "Dropping redelivered envelope for job {} in terminal state {}",
                job_id, row.status
            );
            if let Err(e) = self.queue.ack(delivery.delivery_id).await {
                warn!("Failed to ack redelivery for job {}: {}", job_id, e);
            }
            return Ok(false);
        }

        // Best-effort; a failure here must not burn an attempt
        if let Err(e) = self.metadata.mark_processing(job_id).await {
            warn!("Failed to mark job {} as processing: {}", job_id, e);
        }

        let start = Instant::now();

        let data = self.fetch_payload(envelope).await?;

        let (processed, face_meta) = tokio::time::timeout(
            self.worker_timeout,
            self.models
                .detect_and_blur_faces(data, &envelope.content_type),
        )
        .await
        .map_err(|_| StepFailure::timeout())??;

        let processed_key = keys::processed_key(job_id, envelope.upload_ts, &envelope.content_type);
        let processed_len = processed.len() as i64;
        let processed_url = tokio::time::timeout(
            self.worker_timeout,
            self.blobs
                .put(&processed_key, processed, &envelope.content_type),
        )
        .await
        .map_err(|_| StepFailure::timeout())??;

        let elapsed = start.elapsed().as_secs_f64();
        tokio::time::timeout(
            self.worker_timeout,
            self.metadata.update_on_completion(
                job_id,
                &processed_url,
                processed_len,
                &face_meta,
                elapsed,
            ),
        )
        .await
        .map_err(|_| StepFailure::timeout())??;

        info!(
            "Job {} completed in {:.2}s (faces: {})",
            job_id, elapsed, face_meta.face_count
        );
        Ok(true)
    }

    async fn fetch_payload(&self, envelope: &crate::queue::JobEnvelope) -> Result<Bytes, StepFailure> {
        match &envelope.payload {
            PayloadRef::Inline { data } => Ok(Bytes::from(data.clone())),
            PayloadRef::Staged { key } => {
                tokio::time::timeout(self.worker_timeout, self.blobs.get(key))
                    .await
                    .map_err(|_| StepFailure::timeout())?
                    .map_err(StepFailure::from)
            }
        }
    }

    /// Record a terminal failure, then ack so the envelope never returns.
    /// If the failure cannot be recorded the delivery is nacked instead, so
    /// the job is not silently lost.
    async fn fail_job(&self, delivery: &Delivery, reason_kind: &'static str, elapsed: f64) {
        let job_id = delivery.envelope.job_id;

        match self
            .metadata
            .mark_failed(job_id, reason_kind, Some(elapsed))
            .await
        {
            Ok(()) => {
                self.stats.record_failed();
                if let Err(e) = self.queue.ack(delivery.delivery_id).await {
                    warn!("Failed to ack failed job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                error!(
                    "Failed to record failure for job {} ({}): {}",
                    job_id, reason_kind, e
                );
                if let Err(nack_err) = self
                    .queue
                    .nack_delayed(
                        delivery.delivery_id,
                        reason_kind,
                        worker_backoff_delay(delivery.envelope.attempts),
                    )
                    .await
                {
                    warn!("Failed to nack job {}: {}", job_id, nack_err);
                }
            }
        }
    }
}
