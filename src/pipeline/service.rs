use crate::config::Config;
use crate::db::{MetadataError, MetadataStore, RecordFilters};
use crate::model::ModelManager;
use crate::pipeline::dispatcher::Dispatcher;
use crate::pipeline::error::PipelineError;
use crate::pipeline::gate::{AdmissionGate, BatchOutcome, SubmitOutcome};
use crate::pipeline::stats::StatsAggregator;
use crate::pipeline::status::{HealthReport, JobStatusView, PipelineStats, QueueStatus};
use crate::pipeline::worker::Worker;
use crate::queue::JobQueue;
use crate::s3::BlobStore;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// The facade the ingestion layer talks to: admission on one side, the
/// dispatcher and read-only views on the other. The gate and the workers
/// coordinate only through the queue and the metadata store.
pub struct Pipeline<Q, B, M> {
    gate: AdmissionGate<Q, B, M>,
    dispatcher: Dispatcher<Q, B, M>,
    metadata: Arc<M>,
    models: Arc<ModelManager>,
    stats: Arc<StatsAggregator>,
}

impl<Q: JobQueue, B: BlobStore, M: MetadataStore> Pipeline<Q, B, M> {
    pub fn new(
        config: &Config,
        queue: Arc<Q>,
        blobs: Arc<B>,
        metadata: Arc<M>,
        models: Arc<ModelManager>,
    ) -> Result<Self, PipelineError> {
        let stats = Arc::new(StatsAggregator::new());
        let worker_timeout = Duration::from_secs(config.pipeline.worker_timeout_seconds);

        let gate = AdmissionGate::new(
            queue.clone(),
            blobs.clone(),
            metadata.clone(),
            models.clone(),
            config.queue.max_queue_size,
            config.pipeline.inline_payload_max_bytes,
        );

        let worker = Worker::new(
            queue.clone(),
            blobs,
            metadata.clone(),
            models.clone(),
            stats.clone(),
            worker_timeout,
            config.pipeline.max_attempts,
        );

        let dispatcher = Dispatcher::new(
            worker,
            queue,
            metadata.clone(),
            config.pipeline.num_workers,
            worker_timeout,
        )?;

        Ok(Self {
            gate,
            dispatcher,
            metadata,
            models,
            stats,
        })
    }

    /// Start the worker pool
    pub async fn start(&self) {
        self.dispatcher.start().await;
    }

    /// Drain in-flight work and stop
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }

    pub async fn submit(
        &self,
        data: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<SubmitOutcome, PipelineError> {
        self.gate.submit(data, filename, content_type).await
    }

    pub async fn submit_batch(
        &self,
        files: Vec<(Bytes, String, String)>,
    ) -> Result<BatchOutcome, PipelineError> {
        self.gate.submit_batch(files).await
    }

    pub async fn get_status(
        &self,
        job_id: Uuid,
    ) -> Result<Option<JobStatusView>, MetadataError> {
        let record = self.metadata.get_by_job_id(job_id).await?;
        Ok(record.map(|r| JobStatusView::from_record(r, self.models.versions())))
    }

    pub async fn query(
        &self,
        filters: &RecordFilters,
        limit: u32,
    ) -> Result<Vec<JobStatusView>, MetadataError> {
        let records = self.metadata.query(filters, limit).await?;
        Ok(records
            .into_iter()
            .map(|r| JobStatusView::from_record(r, self.models.versions()))
            .collect())
    }

    pub async fn stats(&self) -> Result<PipelineStats, MetadataError> {
        let live = self.stats.live();
        let durable = self.metadata.aggregate().await?;

        Ok(PipelineStats {
            processed_total: live.processed_total,
            failed_total: live.failed_total,
            throughput_per_minute: live.throughput_per_minute,
            avg_processing_seconds: live.avg_processing_seconds,
            durable,
        })
    }

    pub async fn queue_status(&self) -> QueueStatus {
        let depth = match self.dispatcher.queue_depth().await {
            Ok(depth) => depth,
            Err(e) => {
                warn!("Queue depth probe failed: {}", e);
                -1
            }
        };

        QueueStatus {
            depth,
            active_workers: self.dispatcher.active_workers(),
        }
    }

    pub async fn health(&self) -> HealthReport {
        let queue_ok = self.dispatcher.queue_depth().await.is_ok();
        let metadata_ok = self.metadata.ping().await.is_ok();

        HealthReport {
            healthy: queue_ok && metadata_ok,
            queue_ok,
            metadata_ok,
            active_workers: self.dispatcher.active_workers(),
        }
    }
}
