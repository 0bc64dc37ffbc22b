use crate::config::MetadataConfig;
use crate::db::error::MetadataError;
use crate::db::models::{AggregateStats, JobRecord, JobStatus, RecordFilters};
use crate::db::store::MetadataStore;
use crate::model::FaceMeta;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row as _};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Macro to extract a field from a database row with error handling
macro_rules! get_field {
    ($row:expr, $field:expr) => {
        $row.try_get($field)
            .map_err(|e| MetadataError::DeserializationError(e.to_string()))?
    };
}

/// A PostgreSQL implementation of the MetadataStore trait
pub struct PostgresMetadataStore {
    pool: PgPool,
}

impl PostgresMetadataStore {
    /// Create a new PostgresMetadataStore with the given configuration
    pub async fn new(config: &MetadataConfig) -> Result<Self, MetadataError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(&config.url)
            .map_err(|e| {
                error!("Failed to create metadata connection pool: {}", e);
                MetadataError::ConnectionError(e.to_string())
            })?;

        if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
            error!("Metadata store connectivity test failed: {}", e);
            return Err(MetadataError::ConnectionError(format!(
                "Metadata store is not accessible: {}",
                e
            )));
        };

        info!("Metadata store connection established successfully");
        Ok(PostgresMetadataStore { pool })
    }

    /// Create the `processed_images` table and its indexes
    pub async fn create_schema(&self) -> Result<(), MetadataError> {
        info!("Initializing processed_images schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_images (
                id UUID PRIMARY KEY,
                job_id UUID UNIQUE NOT NULL,
                original_filename VARCHAR(500) NOT NULL,
                content_type VARCHAR(100) NOT NULL,
                blob_original_url VARCHAR(1000),
                blob_processed_url VARCHAR(1000),
                is_vehicle_detected BOOLEAN NOT NULL DEFAULT FALSE,
                is_face_detected BOOLEAN NOT NULL DEFAULT FALSE,
                is_face_blurred BOOLEAN NOT NULL DEFAULT FALSE,
                file_size_original BIGINT NOT NULL,
                file_size_processed BIGINT,
                processing_time_seconds DOUBLE PRECISION,
                vehicle_detection_data JSONB,
                face_detection_data JSONB,
                failure_reason TEXT,
                status VARCHAR(20) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                processed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create processed_images table: {}", e);
            MetadataError::QueryError(format!("Failed to create table: {}", e))
        })?;

        for index_query in [
            "CREATE INDEX IF NOT EXISTS processed_images_created_at_idx ON processed_images (created_at)",
            "CREATE INDEX IF NOT EXISTS processed_images_vehicle_idx ON processed_images (is_vehicle_detected)",
            "CREATE INDEX IF NOT EXISTS processed_images_face_idx ON processed_images (is_face_detected)",
            "CREATE INDEX IF NOT EXISTS processed_images_blurred_idx ON processed_images (is_face_blurred)",
        ] {
            sqlx::query(index_query).execute(&self.pool).await.map_err(|e| {
                error!("Failed to create index: {}", e);
                MetadataError::QueryError(format!("Failed to create index: {}", e))
            })?;
        }

        info!("processed_images schema initialized successfully");
        Ok(())
    }

    /// Helper function to create a JobRecord from a database row
    fn row_to_record(&self, row: sqlx::postgres::PgRow) -> Result<JobRecord, MetadataError> {
        let status_str: String = get_field!(row, "status");
        let status = JobStatus::from_str(&status_str)
            .map_err(MetadataError::DeserializationError)?;

        Ok(JobRecord {
            id: get_field!(row, "id"),
            job_id: get_field!(row, "job_id"),
            original_filename: get_field!(row, "original_filename"),
            content_type: get_field!(row, "content_type"),
            blob_original_url: get_field!(row, "blob_original_url"),
            blob_processed_url: get_field!(row, "blob_processed_url"),
            is_vehicle_detected: get_field!(row, "is_vehicle_detected"),
            is_face_detected: get_field!(row, "is_face_detected"),
            is_face_blurred: get_field!(row, "is_face_blurred"),
            file_size_original: get_field!(row, "file_size_original"),
            file_size_processed: get_field!(row, "file_size_processed"),
            processing_time_seconds: get_field!(row, "processing_time_seconds"),
            vehicle_detection_data: get_field!(row, "vehicle_detection_data"),
            face_detection_data: get_field!(row, "face_detection_data"),
            failure_reason: get_field!(row, "failure_reason"),
            status,
            created_at: get_field!(row, "created_at"),
            processed_at: get_field!(row, "processed_at"),
        })
    }

    const SELECT_COLUMNS: &'static str = r#"
        id, job_id, original_filename, content_type,
        blob_original_url, blob_processed_url,
        is_vehicle_detected, is_face_detected, is_face_blurred,
        file_size_original, file_size_processed, processing_time_seconds,
        vehicle_detection_data, face_detection_data,
        failure_reason, status, created_at, processed_at
    "#;
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn insert(&self, record: &JobRecord) -> Result<(), MetadataError> {
        debug!(
            "Inserting job record: job_id={}, status={}",
            record.job_id, record.status
        );

        sqlx::query(
            r#"
            INSERT INTO processed_images (
                id, job_id, original_filename, content_type,
                blob_original_url, blob_processed_url,
                is_vehicle_detected, is_face_detected, is_face_blurred,
                file_size_original, file_size_processed, processing_time_seconds,
                vehicle_detection_data, face_detection_data,
                failure_reason, status, created_at, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(record.id)
        .bind(record.job_id)
        .bind(&record.original_filename)
        .bind(&record.content_type)
        .bind(&record.blob_original_url)
        .bind(&record.blob_processed_url)
        .bind(record.is_vehicle_detected)
        .bind(record.is_face_detected)
        .bind(record.is_face_blurred)
        .bind(record.file_size_original)
        .bind(record.file_size_processed)
        .bind(record.processing_time_seconds)
        .bind(&record.vehicle_detection_data)
        .bind(&record.face_detection_data)
        .bind(&record.failure_reason)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return MetadataError::Duplicate(record.job_id.to_string());
                }
            }
            error!("Failed to insert job record: {}", e);
            MetadataError::QueryError(e.to_string())
        })?;

        Ok(())
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<(), MetadataError> {
        debug!("Marking job as processing: {}", job_id);

        sqlx::query(
            "UPDATE processed_images SET status = 'processing'
             WHERE job_id = $1 AND status IN ('submitted', 'processing')",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| MetadataError::QueryError(e.to_string()))?;

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
        let face_detected = face_meta.face_count > 0;
        let face_data = serde_json::to_value(face_meta)
            .map_err(|e| MetadataError::QueryError(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE processed_images SET
                blob_processed_url = $2,
                file_size_processed = $3,
                is_face_detected = $4,
                is_face_blurred = $4,
                face_detection_data = $5,
                processing_time_seconds = $6,
                failure_reason = NULL,
                status = 'completed',
                processed_at = $7
            WHERE job_id = $1 AND status <> 'completed'
            "#,
        )
        .bind(job_id)
        .bind(processed_url)
        .bind(processed_size)
        .bind(face_detected)
        .bind(face_data)
        .bind(duration_seconds)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| MetadataError::QueryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Either the row is already completed (idempotent re-delivery) or
            // it never existed.
            let exists = self.get_by_job_id(job_id).await?;
            if exists.is_none() {
                return Err(MetadataError::NotFound(job_id.to_string()));
            }
            debug!("Completion update was a no-op for job {}", job_id);
        }

        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        reason_kind: &str,
        duration_seconds: Option<f64>,
    ) -> Result<(), MetadataError> {
        debug!("Marking job as failed: {} ({})", job_id, reason_kind);

        let result = sqlx::query(
            r#"
            UPDATE processed_images SET
                status = 'failed',
                failure_reason = $2,
                processing_time_seconds = COALESCE($3, processing_time_seconds)
            WHERE job_id = $1 AND status <> 'completed'
            "#,
        )
        .bind(job_id)
        .bind(reason_kind)
        .bind(duration_seconds)
        .execute(&self.pool)
        .await
        .map_err(|e| MetadataError::QueryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            let exists = self.get_by_job_id(job_id).await?;
            if exists.is_none() {
                return Err(MetadataError::NotFound(job_id.to_string()));
            }
        }

        Ok(())
    }

    async fn get_by_job_id(&self, job_id: Uuid) -> Result<Option<JobRecord>, MetadataError> {
        let query = format!(
            "SELECT {} FROM processed_images WHERE job_id = $1",
            Self::SELECT_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MetadataError::QueryError(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(self.row_to_record(row)?)),
            None => Ok(None),
        }
    }

    async fn query(
        &self,
        filters: &RecordFilters,
        limit: u32,
    ) -> Result<Vec<JobRecord>, MetadataError> {
        debug!("Querying records with filters={:?}, limit={}", filters, limit);

        // Build WHERE clause dynamically based on provided filters
        let mut where_clauses = Vec::new();
        let mut bound_flags: Vec<bool> = Vec::new();
        let mut param_count = 1;

        for (column, value) in [
            ("is_vehicle_detected", filters.is_vehicle_detected),
            ("is_face_detected", filters.is_face_detected),
            ("is_face_blurred", filters.is_face_blurred),
        ] {
            if let Some(flag) = value {
                where_clauses.push(format!("{} = ${}", column, param_count));
                bound_flags.push(flag);
                param_count += 1;
            }
        }

        let query = if where_clauses.is_empty() {
            format!(
                "SELECT {} FROM processed_images ORDER BY created_at DESC LIMIT ${}",
                Self::SELECT_COLUMNS,
                param_count
            )
        } else {
            format!(
                "SELECT {} FROM processed_images WHERE {} ORDER BY created_at DESC LIMIT ${}",
                Self::SELECT_COLUMNS,
                where_clauses.join(" AND "),
                param_count
            )
        };

        let mut query_builder = sqlx::query(&query);
        for flag in bound_flags {
            query_builder = query_builder.bind(flag);
        }
        query_builder = query_builder.bind(i64::from(limit));

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MetadataError::QueryError(e.to_string()))?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            result.push(self.row_to_record(row)?);
        }

        Ok(result)
    }

    async fn aggregate(&self) -> Result<AggregateStats, MetadataError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE is_vehicle_detected) AS vehicles_detected,
                COUNT(*) FILTER (WHERE is_face_detected) AS faces_detected,
                COUNT(*) FILTER (WHERE is_face_blurred) AS faces_blurred,
                AVG(processing_time_seconds) FILTER (WHERE status = 'completed')
                    AS avg_processing_seconds
            FROM processed_images
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MetadataError::QueryError(e.to_string()))?;

        Ok(AggregateStats {
            total: get_field!(row, "total"),
            vehicles_detected: get_field!(row, "vehicles_detected"),
            faces_detected: get_field!(row, "faces_detected"),
            faces_blurred: get_field!(row, "faces_blurred"),
            avg_processing_seconds: get_field!(row, "avg_processing_seconds"),
        })
    }

    async fn ping(&self) -> Result<(), MetadataError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MetadataError::ConnectionError(e.to_string()))?;
        Ok(())
    }
}
