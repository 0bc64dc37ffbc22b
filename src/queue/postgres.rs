use crate::config::QueueConfig;
use crate::queue::envelope::{Delivery, JobEnvelope};
use crate::queue::error::QueueError;
use crate::queue::queue::JobQueue;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row as _};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A PostgreSQL implementation of the JobQueue trait.
///
/// Envelopes live in a single `job_queue` table; visibility is a timestamp
/// column, and pops race through `FOR UPDATE SKIP LOCKED` so concurrent
/// workers never hand the same delivery out twice within a visibility window.
pub struct PostgresJobQueue {
    pool: PgPool,
    max_queue_size: i64,
    visibility_timeout: chrono::Duration,
    poll_interval: Duration,
}

impl PostgresJobQueue {
    /// Create a new PostgresJobQueue with the given configuration
    pub async fn new(config: &QueueConfig) -> Result<Self, QueueError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(&config.url)
            .map_err(|e| {
                error!("Failed to create queue connection pool: {}", e);
                QueueError::Unavailable(e.to_string())
            })?;

        if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
            error!("Queue connectivity test failed: {}", e);
            return Err(QueueError::Unavailable(format!(
                "Queue backing store is not accessible: {}",
                e
            )));
        }

        info!("Queue backing store connection established successfully");
        Ok(PostgresJobQueue {
            pool,
            max_queue_size: config.max_queue_size,
            visibility_timeout: chrono::Duration::seconds(
                config.visibility_timeout_seconds as i64,
            ),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// Create the backing table and its visibility index
    pub async fn create_schema(&self) -> Result<(), QueueError> {
        info!("Initializing job_queue schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_queue (
                delivery_id BIGSERIAL PRIMARY KEY,
                envelope JSONB NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                visible_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                enqueued_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Unavailable(format!("Failed to create job_queue table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS job_queue_visible_at_idx ON job_queue (visible_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Unavailable(format!("Failed to create index: {}", e)))?;

        info!("job_queue schema initialized successfully");
        Ok(())
    }

    /// Single non-blocking pop attempt
    async fn try_pop(&self) -> Result<Option<Delivery>, QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        let row = sqlx::query(
            r#"
            SELECT delivery_id, envelope, attempts
            FROM job_queue
            WHERE visible_at <= NOW()
            ORDER BY delivery_id
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let delivery_id: i64 = row
            .try_get("delivery_id")
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let envelope_value: serde_json::Value = row
            .try_get("envelope")
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let attempts: i32 = row
            .try_get("attempts")
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let mut envelope: JobEnvelope = serde_json::from_value(envelope_value)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        // The column is authoritative: nacks bump it without rewriting the JSON
        envelope.attempts = attempts.max(0) as u32;

        sqlx::query("UPDATE job_queue SET visible_at = $2 WHERE delivery_id = $1")
            .bind(delivery_id)
            .bind(Utc::now() + self.visibility_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        debug!(
            "Popped delivery {} for job {} (attempt {})",
            delivery_id, envelope.job_id, envelope.attempts
        );
        Ok(Some(Delivery {
            delivery_id,
            envelope,
        }))
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn push(&self, envelope: &JobEnvelope) -> Result<i64, QueueError> {
        let depth = self.depth().await?;
        if depth >= self.max_queue_size {
            warn!(
                "Rejecting push for job {}: queue depth {} at maximum {}",
                envelope.job_id, depth, self.max_queue_size
            );
            return Err(QueueError::Backpressure {
                depth,
                max: self.max_queue_size,
            });
        }

        let envelope_value =
            serde_json::to_value(envelope).map_err(|e| QueueError::Serialization(e.to_string()))?;

        let row = sqlx::query(
            "INSERT INTO job_queue (envelope, attempts, visible_at)
             VALUES ($1, $2, NOW()) RETURNING delivery_id",
        )
        .bind(envelope_value)
        .bind(envelope.attempts as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        let delivery_id: i64 = row
            .try_get("delivery_id")
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        debug!(
            "Pushed envelope for job {} as delivery {}",
            envelope.job_id, delivery_id
        );
        Ok(delivery_id)
    }

    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(delivery) = self.try_pop().await? {
                return Ok(Some(delivery));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let remaining = deadline - now;
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    async fn ack(&self, delivery_id: i64) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM job_queue WHERE delivery_id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        if result.rows_affected() == 0 {
            warn!("Ack for unknown delivery {}", delivery_id);
        }
        Ok(())
    }

    async fn nack(&self, delivery_id: i64, reason: &str) -> Result<(), QueueError> {
        self.nack_delayed(delivery_id, reason, Duration::ZERO).await
    }

    async fn nack_delayed(
        &self,
        delivery_id: i64,
        reason: &str,
        delay: Duration,
    ) -> Result<(), QueueError> {
        debug!(
            "Nacking delivery {} (reason: {}, delay: {:?})",
            delivery_id, reason, delay
        );

        let visible_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        let result = sqlx::query(
            "UPDATE job_queue SET visible_at = $2, attempts = attempts + 1
             WHERE delivery_id = $1",
        )
        .bind(delivery_id)
        .bind(visible_at)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        if result.rows_affected() == 0 {
            warn!("Nack for unknown delivery {}", delivery_id);
        }
        Ok(())
    }

    async fn depth(&self) -> Result<i64, QueueError> {
        let row = sqlx::query("SELECT COUNT(*) AS depth FROM job_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        row.try_get("depth")
            .map_err(|e| QueueError::Serialization(e.to_string()))
    }
}
