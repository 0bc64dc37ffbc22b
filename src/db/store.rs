use crate::db::error::MetadataError;
use crate::db::models::{AggregateStats, JobRecord, RecordFilters};
use crate::model::FaceMeta;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// MetadataStore trait defining the interface for the durable job records
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Insert a freshly admitted record. A `job_id` collision is reported as
    /// the distinct `Duplicate` error kind.
    async fn insert(&self, record: &JobRecord) -> Result<(), MetadataError>;

    /// Best-effort transition to `processing` when a worker picks the job up.
    /// Never touches terminal rows.
    async fn mark_processing(&self, job_id: Uuid) -> Result<(), MetadataError>;

    /// Atomic completion update: sets the processed artifact fields, derives
    /// the face flags from `face_meta.face_count`, and stamps `processed_at`.
    /// A row that is already `completed` is left untouched.
    async fn update_on_completion(
        &self,
        job_id: Uuid,
        processed_url: &str,
        processed_size: i64,
        face_meta: &FaceMeta,
        duration_seconds: f64,
    ) -> Result<(), MetadataError>;

    /// Mark a job failed with a short reason kind. Never regresses a
    /// `completed` row.
    async fn mark_failed(
        &self,
        job_id: Uuid,
        reason_kind: &str,
        duration_seconds: Option<f64>,
    ) -> Result<(), MetadataError>;

    /// Fetch a record by its job id
    async fn get_by_job_id(&self, job_id: Uuid) -> Result<Option<JobRecord>, MetadataError>;

    /// Indexed filter over the boolean flags
    async fn query(
        &self,
        filters: &RecordFilters,
        limit: u32,
    ) -> Result<Vec<JobRecord>, MetadataError>;

    /// Server-side aggregates over the full table
    async fn aggregate(&self) -> Result<AggregateStats, MetadataError>;

    /// Cheap connectivity probe for health reporting
    async fn ping(&self) -> Result<(), MetadataError>;
}

/// Implementation of MetadataStore trait for Arc<T> where T implements
/// MetadataStore, so stores can be shared across gate and workers.
#[async_trait]
impl<T: MetadataStore + ?Sized> MetadataStore for Arc<T> {
    async fn insert(&self, record: &JobRecord) -> Result<(), MetadataError> {
        (**self).insert(record).await
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<(), MetadataError> {
        (**self).mark_processing(job_id).await
    }

    async fn update_on_completion(
        &self,
        job_id: Uuid,
        processed_url: &str,
        processed_size: i64,
        face_meta: &FaceMeta,
        duration_seconds: f64,
    ) -> Result<(), MetadataError> {
        (**self)
            .update_on_completion(job_id, processed_url, processed_size, face_meta, duration_seconds)
            .await
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        reason_kind: &str,
        duration_seconds: Option<f64>,
    ) -> Result<(), MetadataError> {
        (**self)
            .mark_failed(job_id, reason_kind, duration_seconds)
            .await
    }

    async fn get_by_job_id(&self, job_id: Uuid) -> Result<Option<JobRecord>, MetadataError> {
        (**self).get_by_job_id(job_id).await
    }

    async fn query(
        &self,
        filters: &RecordFilters,
        limit: u32,
    ) -> Result<Vec<JobRecord>, MetadataError> {
        (**self).query(filters, limit).await
    }

    async fn aggregate(&self) -> Result<AggregateStats, MetadataError> {
        (**self).aggregate().await
    }

    async fn ping(&self) -> Result<(), MetadataError> {
        (**self).ping().await
    }
}
