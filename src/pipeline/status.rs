use crate::db::{AggregateStats, JobRecord, JobStatus};
use crate::model::ModelVersions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job status payload handed to the ingestion layer.
///
/// Completed jobs carry both blob URLs and the full detection metadata;
/// failed jobs carry the reason kind and no processed artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: String,
    pub updated_at: DateTime<Utc>,
    pub original_url: Option<String>,
    pub processed_url: Option<String>,
    pub blur_metadata: Option<serde_json::Value>,
    pub detection_metadata: Option<serde_json::Value>,
    pub processing_time_seconds: Option<f64>,
    pub failure_reason: Option<String>,
    pub model_versions: ModelVersions,
}

impl JobStatusView {
    pub fn from_record(record: JobRecord, model_versions: ModelVersions) -> Self {
        let completed = record.status == JobStatus::Completed;

        Self {
            job_id: record.job_id,
            status: record.status.as_str().to_string(),
            updated_at: record.processed_at.unwrap_or(record.created_at),
            original_url: record.blob_original_url,
            processed_url: if completed {
                record.blob_processed_url
            } else {
                None
            },
            blur_metadata: if completed {
                record.face_detection_data
            } else {
                None
            },
            detection_metadata: record.vehicle_detection_data,
            processing_time_seconds: record.processing_time_seconds,
            failure_reason: record.failure_reason,
            model_versions,
        }
    }
}

/// Live counters merged with durable aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub processed_total: u64,
    pub failed_total: u64,
    pub throughput_per_minute: u64,
    pub avg_processing_seconds: Option<f64>,
    pub durable: AggregateStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub depth: i64,
    pub active_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub queue_ok: bool,
    pub metadata_ok: bool,
    pub active_workers: usize,
}
