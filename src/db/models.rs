use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a job.
///
/// `Rejected` exists only as an admission outcome; a rejected submission has
/// no durable row and no worker ever observes the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Submitted,
    Processing,
    Completed,
    Failed,
    Rejected,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Rejected => "rejected",
        }
    }

    /// Terminal states are never left once entered
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Rejected
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(JobStatus::Submitted),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "rejected" => Ok(JobStatus::Rejected),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// One row of the `processed_images` table: the durable record of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub original_filename: String,
    pub content_type: String,
    pub blob_original_url: Option<String>,
    pub blob_processed_url: Option<String>,
    pub is_vehicle_detected: bool,
    pub is_face_detected: bool,
    pub is_face_blurred: bool,
    pub file_size_original: i64,
    pub file_size_processed: Option<i64>,
    pub processing_time_seconds: Option<f64>,
    pub vehicle_detection_data: Option<serde_json::Value>,
    pub face_detection_data: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Record as created by the admission gate: vehicle confirmed, original
    /// uploaded, processing outcome still unknown.
    pub fn submitted(
        job_id: Uuid,
        original_filename: &str,
        content_type: &str,
        original_url: &str,
        file_size_original: i64,
        vehicle_detection_data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            original_filename: original_filename.to_string(),
            content_type: content_type.to_string(),
            blob_original_url: Some(original_url.to_string()),
            blob_processed_url: None,
            is_vehicle_detected: true,
            is_face_detected: false,
            is_face_blurred: false,
            file_size_original,
            file_size_processed: None,
            processing_time_seconds: None,
            vehicle_detection_data: Some(vehicle_detection_data),
            face_detection_data: None,
            failure_reason: None,
            status: JobStatus::Submitted,
            created_at,
            processed_at: None,
        }
    }
}

/// Boolean-flag filters for record queries
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFilters {
    pub is_vehicle_detected: Option<bool>,
    pub is_face_detected: Option<bool>,
    pub is_face_blurred: Option<bool>,
}

/// Server-side aggregates over the full table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total: i64,
    pub vehicles_detected: i64,
    pub faces_detected: i64,
    pub faces_blurred: i64,
    pub avg_processing_seconds: Option<f64>,
}
