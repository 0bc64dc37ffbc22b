use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the image bytes for a job live. Small payloads travel inline in the
/// envelope; large ones are staged in the blob store ahead of enqueue and the
/// envelope carries only the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadRef {
    Inline { data: Vec<u8> },
    Staged { key: String },
}

impl PayloadRef {
    pub fn inline(data: Vec<u8>) -> Self {
        PayloadRef::Inline { data }
    }

    pub fn staged(key: impl Into<String>) -> Self {
        PayloadRef::Staged { key: key.into() }
    }
}

/// The unit of work in the queue: everything needed to process one job.
///
/// The envelope may be delivered more than once (at-least-once); `job_id`
/// identifies the logical job across all deliveries, and `upload_ts` keeps
/// blob keys stable across retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: Uuid,
    pub original_filename: String,
    pub content_type: String,
    pub payload: PayloadRef,
    pub upload_ts: i64,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub trace_id: Uuid,
}

impl JobEnvelope {
    pub fn new(
        job_id: Uuid,
        original_filename: &str,
        content_type: &str,
        payload: PayloadRef,
        upload_ts: i64,
    ) -> Self {
        Self {
            job_id,
            original_filename: original_filename.to_string(),
            content_type: content_type.to_string(),
            payload,
            upload_ts,
            enqueued_at: Utc::now(),
            attempts: 0,
            trace_id: Uuid::new_v4(),
        }
    }
}

/// A popped envelope together with its server-assigned delivery identifier
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_id: i64,
    pub envelope: JobEnvelope,
}
