use crate::db::error::MetadataError;
use crate::db::models::{AggregateStats, JobRecord, JobStatus, RecordFilters};
use crate::db::store::MetadataStore;
use crate::model::FaceMeta;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// A fake in-memory implementation of the MetadataStore trait for testing
pub struct FakeMetadataStore {
    records: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
    // number of completion updates to fail before succeeding
    fail_completion_updates: Arc<RwLock<u32>>,
    unavailable: Arc<RwLock<bool>>,
}

#[allow(dead_code)]
impl FakeMetadataStore {
    pub fn new() -> Self {
        FakeMetadataStore {
            records: Arc::new(RwLock::new(HashMap::new())),
            fail_completion_updates: Arc::new(RwLock::new(0)),
            unavailable: Arc::new(RwLock::new(false)),
        }
    }

    /// Fail the next `count` completion updates with a query error, simulating
    /// a worker crash between the model step and the row update
    pub fn fake_fail_completion_updates(&self, count: u32) {
        let mut fail = self.fail_completion_updates.write().unwrap();
        *fail = count;
    }

    /// Make every operation fail until restored
    pub fn fake_set_unavailable(&self, unavailable: bool) {
        let mut flag = self.unavailable.write().unwrap();
        *flag = unavailable;
    }

    /// Number of stored records
    pub fn record_count(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Records currently in the given status
    pub fn records_with_status(&self, status: JobStatus) -> Vec<JobRecord> {
        self.records
            .read()
            .unwrap()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }

    fn check_available(&self) -> Result<(), MetadataError> {
        if *self.unavailable.read().unwrap() {
            return Err(MetadataError::ConnectionError(
                "injected outage".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for FakeMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for FakeMetadataStore {
    async fn insert(&self, record: &JobRecord) -> Result<(), MetadataError> {
        self.check_available()?;

        let mut records = self.records.write().unwrap();
        if records.contains_key(&record.job_id) {
            return Err(MetadataError::Duplicate(record.job_id.to_string()));
        }
        records.insert(record.job_id, record.clone());
        Ok(())
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<(), MetadataError> {
        self.check_available()?;

        let mut records = self.records.write().unwrap();
        if let Some(record) = records.get_mut(&job_id) {
            if !record.status.is_terminal() {
                record.status = JobStatus::Processing;
            }
        }
        Ok(())
    }

    async fn update_on_completion(
        &self,
        job_id: Uuid,
        processed_url: &str,
        processed_size: i64,
        face_meta: &FaceMeta,
        duration_seconds: f64,
    ) -> Result<(), MetadataError> {
        self.check_available()?;

        {
            let mut fail = self.fail_completion_updates.write().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(MetadataError::QueryError(
                    "injected completion failure".to_string(),
                ));
            }
        }

        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| MetadataError::NotFound(job_id.to_string()))?;

        if record.status == JobStatus::Completed {
            return Ok(());
        }

        let face_detected = face_meta.face_count > 0;
        record.blob_processed_url = Some(processed_url.to_string());
        record.file_size_processed = Some(processed_size);
        record.is_face_detected = face_detected;
        record.is_face_blurred = face_detected;
        record.face_detection_data = Some(
            serde_json::to_value(face_meta)
                .map_err(|e| MetadataError::QueryError(e.to_string()))?,
        );
        record.processing_time_seconds = Some(duration_seconds);
        record.failure_reason = None;
        record.status = JobStatus::Completed;
        record.processed_at = Some(Utc::now());

        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        reason_kind: &str,
        duration_seconds: Option<f64>,
    ) -> Result<(), MetadataError> {
        self.check_available()?;

        let mut records = self.records.write().unwrap();
        let record = records
            .get_mut(&job_id)
            .ok_or_else(|| MetadataError::NotFound(job_id.to_string()))?;

        if record.status == JobStatus::Completed {
            return Ok(());
        }

        record.status = JobStatus::Failed;
        record.failure_reason = Some(reason_kind.to_string());
        if duration_seconds.is_some() {
            record.processing_time_seconds = duration_seconds;
        }

        Ok(())
    }

    async fn get_by_job_id(&self, job_id: Uuid) -> Result<Option<JobRecord>, MetadataError> {
        self.check_available()?;

        let records = self.records.read().unwrap();
        Ok(records.get(&job_id).cloned())
    }

    async fn query(
        &self,
        filters: &RecordFilters,
        limit: u32,
    ) -> Result<Vec<JobRecord>, MetadataError> {
        self.check_available()?;

        let records = self.records.read().unwrap();
        let mut matched: Vec<JobRecord> = records
            .values()
            .filter(|r| {
                filters
                    .is_vehicle_detected
                    .map_or(true, |f| r.is_vehicle_detected == f)
                    && filters
                        .is_face_detected
                        .map_or(true, |f| r.is_face_detected == f)
                    && filters
                        .is_face_blurred
                        .map_or(true, |f| r.is_face_blurred == f)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit as usize);
        Ok(matched)
    }

    async fn aggregate(&self) -> Result<AggregateStats, MetadataError> {
        self.check_available()?;

        let records = self.records.read().unwrap();
        let completed_durations: Vec<f64> = records
            .values()
            .filter(|r| r.status == JobStatus::Completed)
            .filter_map(|r| r.processing_time_seconds)
            .collect();

        let avg = if completed_durations.is_empty() {
            None
        } else {
            Some(completed_durations.iter().sum::<f64>() / completed_durations.len() as f64)
        };

        Ok(AggregateStats {
            total: records.len() as i64,
            vehicles_detected: records.values().filter(|r| r.is_vehicle_detected).count() as i64,
            faces_detected: records.values().filter(|r| r.is_face_detected).count() as i64,
            faces_blurred: records.values().filter(|r| r.is_face_blurred).count() as i64,
            avg_processing_seconds: avg,
        })
    }

    async fn ping(&self) -> Result<(), MetadataError> {
        self.check_available()
    }
}
