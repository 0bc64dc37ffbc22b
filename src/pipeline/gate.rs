use crate::db::{JobRecord, MetadataError, MetadataStore};
use crate::model::{ModelError, ModelManager};
use crate::pipeline::error::PipelineError;
use crate::pipeline::retry::{push_retry_delay, PUSH_MAX_TRIES};
use crate::queue::{JobEnvelope, JobQueue, PayloadRef, QueueError};
use crate::s3::{keys, BlobStore};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of a submission: either a minted job or a rejection with a reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted { job_id: Uuid },
    Rejected { reason: RejectReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The pre-check found no vehicle; not an error
    NoVehicle,
    /// The submission itself is malformed (empty payload, bad MIME, bytes
    /// the decoder cannot read)
    Invalid(String),
    StorageUnavailable,
    QueueUnavailable,
    MetadataUnavailable,
    ModelUnavailable,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NoVehicle => "no-vehicle",
            RejectReason::Invalid(_) => "validation",
            RejectReason::StorageUnavailable => "storage-unavailable",
            RejectReason::QueueUnavailable => "queue-unavailable",
            RejectReason::MetadataUnavailable => "metadata-unavailable",
            RejectReason::ModelUnavailable => "model-unavailable",
        }
    }
}

/// Result of a batch submission; admission of each file is independent
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub accepted: Vec<Uuid>,
    pub rejected_no_vehicle: u32,
    pub invalid: u32,
    pub unavailable: u32,
}

/// The synchronous pre-check deciding whether a submission becomes a job.
///
/// On acceptance exactly one durable row and exactly one envelope exist for
/// the minted `job_id`; on rejection neither does.
pub struct AdmissionGate<Q, B, M> {
    queue: Arc<Q>,
    blobs: Arc<B>,
    metadata: Arc<M>,
    models: Arc<ModelManager>,
    max_queue_size: i64,
    inline_payload_max_bytes: usize,
}

impl<Q: JobQueue, B: BlobStore, M: MetadataStore> AdmissionGate<Q, B, M> {
    pub fn new(
        queue: Arc<Q>,
        blobs: Arc<B>,
        metadata: Arc<M>,
        models: Arc<ModelManager>,
        max_queue_size: i64,
        inline_payload_max_bytes: usize,
    ) -> Self {
        Self {
            queue,
            blobs,
            metadata,
            models,
            max_queue_size,
            inline_payload_max_bytes,
        }
    }

    /// Submit one image. Runs vehicle detection, and only for accepted images
    /// uploads the original, creates the durable row, and enqueues the job.
    pub async fn submit(
        &self,
        data: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<SubmitOutcome, PipelineError> {
        if let Some(reason) = validate(&data, content_type) {
            debug!("Rejecting {}: {:?}", filename, reason);
            return Ok(SubmitOutcome::Rejected { reason });
        }

        let created_at = Utc::now();
        let job_id = Uuid::new_v4();
        let upload_ts = created_at.timestamp();

        let report = match self.models.detect_vehicles(data.clone()).await {
            Ok(report) => report,
            Err(ModelError::Decode(detail)) => {
                debug!("Rejecting {}: undecodable image: {}", filename, detail);
                return Ok(SubmitOutcome::Rejected {
                    reason: RejectReason::Invalid(format!("undecodable image: {}", detail)),
                });
            }
            Err(e) => {
                error!("Vehicle detection unavailable for {}: {}", filename, e);
                return Ok(SubmitOutcome::Rejected {
                    reason: RejectReason::ModelUnavailable,
                });
            }
        };

        if !report.vehicle_detected {
            debug!("Rejecting {}: no vehicle detected", filename);
            return Ok(SubmitOutcome::Rejected {
                reason: RejectReason::NoVehicle,
            });
        }

        // Depth probe ahead of any side effect, so a saturated queue rejects
        // without leaving a row behind
        match self.queue.depth().await {
            Ok(depth) if depth >= self.max_queue_size => {
                warn!(
                    "Rejecting {}: queue depth {} at maximum {}",
                    filename, depth, self.max_queue_size
                );
                return Ok(SubmitOutcome::Rejected {
                    reason: RejectReason::QueueUnavailable,
                });
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Rejecting {}: queue depth probe failed: {}", filename, e);
                return Ok(SubmitOutcome::Rejected {
                    reason: RejectReason::QueueUnavailable,
                });
            }
        }

        // Large payloads are staged so envelopes stay small; the worker
        // resolves either form uniformly
        let payload = if data.len() > self.inline_payload_max_bytes {
            let staging_key = keys::staging_key(job_id);
            if let Err(e) = self
                .blobs
                .put(&staging_key, data.clone(), content_type)
                .await
            {
                error!("Failed to stage payload for {}: {}", filename, e);
                return Ok(SubmitOutcome::Rejected {
                    reason: RejectReason::StorageUnavailable,
                });
            }
            PayloadRef::staged(staging_key)
        } else {
            PayloadRef::inline(data.to_vec())
        };

        let original_key = keys::original_key(job_id, upload_ts, content_type);
        let original_url = match self
            .blobs
            .put(&original_key, data.clone(), content_type)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                error!("Failed to upload original for {}: {}", filename, e);
                return Ok(SubmitOutcome::Rejected {
                    reason: RejectReason::StorageUnavailable,
                });
            }
        };

        let vehicle_data = serde_json::to_value(&report)
            .map_err(|e| PipelineError::Internal(format!("detection blob encoding: {}", e)))?;
        let record = JobRecord::submitted(
            job_id,
            filename,
            content_type,
            &original_url,
            data.len() as i64,
            vehicle_data,
            created_at,
        );

        match self.metadata.insert(&record).await {
            Ok(()) => {}
            Err(MetadataError::Duplicate(id)) => {
                // Freshly minted UUIDs cannot collide; a duplicate means the
                // store state is corrupt
                return Err(PipelineError::Internal(format!(
                    "duplicate job_id at admission: {}",
                    id
                )));
            }
            Err(e) => {
                error!("Failed to insert job record for {}: {}", filename, e);
                return Ok(SubmitOutcome::Rejected {
                    reason: RejectReason::MetadataUnavailable,
                });
            }
        }

        let envelope = JobEnvelope::new(job_id, filename, content_type, payload, upload_ts);
        if let Err(e) = self.push_with_retry(&envelope).await {
            error!(
                "Queue unavailable for job {} after {} push attempts: {}",
                job_id, PUSH_MAX_TRIES, e
            );
            if let Err(mark_err) = self
                .metadata
                .mark_failed(job_id, "queue-unavailable", None)
                .await
            {
                error!(
                    "Failed to mark job {} as failed after push exhaustion: {}",
                    job_id, mark_err
                );
            }
            return Ok(SubmitOutcome::Rejected {
                reason: RejectReason::QueueUnavailable,
            });
        }

        info!("Accepted job {} for {}", job_id, filename);
        Ok(SubmitOutcome::Accepted { job_id })
    }

    /// Submit a batch of `(bytes, filename, content_type)` files. Each file
    /// is admitted independently; one rejection never affects the others.
    pub async fn submit_batch(
        &self,
        files: Vec<(Bytes, String, String)>,
    ) -> Result<BatchOutcome, PipelineError> {
        let mut outcome = BatchOutcome::default();

        for (data, filename, content_type) in files {
            match self.submit(data, &filename, &content_type).await {
                Ok(SubmitOutcome::Accepted { job_id }) => outcome.accepted.push(job_id),
                Ok(SubmitOutcome::Rejected { reason }) => match reason {
                    RejectReason::NoVehicle => outcome.rejected_no_vehicle += 1,
                    RejectReason::Invalid(_) => outcome.invalid += 1,
                    _ => outcome.unavailable += 1,
                },
                Err(e) => {
                    error!("Internal error admitting {}: {}", filename, e);
                    outcome.unavailable += 1;
                }
            }
        }

        info!(
            "Batch admission: {} accepted, {} no-vehicle, {} invalid, {} unavailable",
            outcome.accepted.len(),
            outcome.rejected_no_vehicle,
            outcome.invalid,
            outcome.unavailable
        );
        Ok(outcome)
    }

    async fn push_with_retry(&self, envelope: &JobEnvelope) -> Result<i64, QueueError> {
        let mut last_err = None;

        for attempt in 0..PUSH_MAX_TRIES {
            match self.queue.push(envelope).await {
                Ok(delivery_id) => return Ok(delivery_id),
                Err(e) => {
                    warn!(
                        "Push attempt {} for job {} failed: {}",
                        attempt + 1,
                        envelope.job_id,
                        e
                    );
                    last_err = Some(e);
                }
            }

            if attempt + 1 < PUSH_MAX_TRIES {
                tokio::time::sleep(push_retry_delay(attempt)).await;
            }
        }

        Err(last_err.expect("at least one push attempt was made"))
    }
}

fn validate(data: &Bytes, content_type: &str) -> Option<RejectReason> {
    if data.is_empty() {
        return Some(RejectReason::Invalid("empty payload".to_string()));
    }

    if !content_type.starts_with("image/") {
        return Some(RejectReason::Invalid(format!(
            "unsupported content type: {}",
            content_type
        )));
    }

    None
}
