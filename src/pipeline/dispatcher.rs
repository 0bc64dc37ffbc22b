use crate::db::MetadataStore;
use crate::pipeline::error::PipelineError;
use crate::pipeline::worker::Worker;
use crate::queue::{JobQueue, QueueError};
use crate::s3::BlobStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const POP_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs `num_workers` concurrent worker loops over the queue.
///
/// The pool size is the process-wide concurrency budget: it bounds model
/// execution as well as in-flight jobs. Shutdown stops popping and drains
/// in-flight work up to the worker timeout; anything still running is left
/// un-acked for the visibility timeout to resurface.
pub struct Dispatcher<Q, B, M> {
    worker: Arc<Worker<Q, B, M>>,
    queue: Arc<Q>,
    metadata: Arc<M>,
    num_workers: usize,
    worker_timeout: Duration,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    busy: Arc<AtomicUsize>,
}

impl<Q: JobQueue, B: BlobStore, M: MetadataStore> Dispatcher<Q, B, M> {
    pub fn new(
        worker: Worker<Q, B, M>,
        queue: Arc<Q>,
        metadata: Arc<M>,
        num_workers: usize,
        worker_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        if num_workers == 0 {
            return Err(PipelineError::Config(
                "dispatcher requires at least one worker".to_string(),
            ));
        }

        Ok(Self {
            worker: Arc::new(worker),
            queue,
            metadata,
            num_workers,
            worker_timeout,
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
            busy: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Spawn the worker loops
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            warn!("Dispatcher already started");
            return;
        }

        info!("Starting {} workers", self.num_workers);
        for worker_index in 0..self.num_workers {
            handles.push(self.spawn_worker_loop(worker_index));
        }
    }

    fn spawn_worker_loop(&self, worker_index: usize) -> JoinHandle<()> {
        let worker = self.worker.clone();
        let queue = self.queue.clone();
        let metadata = self.metadata.clone();
        let token = self.token.clone();
        let busy = self.busy.clone();

        tokio::spawn(async move {
            info!("Worker {} started", worker_index);

            loop {
                let popped = tokio::select! {
                    _ = token.cancelled() => break,
                    popped = queue.blocking_pop(POP_TIMEOUT) => popped,
                };

                let delivery = match popped {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Worker {} failed to pop: {}", worker_index, e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let job_id = delivery.envelope.job_id;
                let delivery_id = delivery.delivery_id;

                busy.fetch_add(1, Ordering::SeqCst);
                let task_worker = worker.clone();
                let joined = tokio::spawn(async move {
                    task_worker.process(delivery).await;
                })
                .await;
                busy.fetch_sub(1, Ordering::SeqCst);

                if let Err(join_err) = joined {
                    if join_err.is_panic() {
                        // A panic is fatal for the job, never for the loop
                        error!("Worker {} panicked processing job {}", worker_index, job_id);
                        if let Err(e) = metadata.mark_failed(job_id, "panic", None).await {
                            error!("Failed to record panic for job {}: {}", job_id, e);
                        }
                        if let Err(e) = queue.ack(delivery_id).await {
                            warn!("Failed to ack panicked job {}: {}", job_id, e);
                        }
                    }
                }
            }

            info!("Worker {} stopped", worker_index);
        })
    }

    /// Stop popping and drain in-flight work, bounded by the worker timeout
    pub async fn shutdown(&self) {
        info!("Dispatcher shutting down");
        self.token.cancel();

        let mut handles = self.handles.lock().await;
        let drain = async {
            while let Some(handle) = handles.pop() {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        error!("Worker loop panicked during shutdown");
                    }
                }
            }
        };

        if tokio::time::timeout(self.worker_timeout, drain).await.is_err() {
            warn!(
                "Drain exceeded {:?}; leaving in-flight envelopes to the visibility timeout",
                self.worker_timeout
            );
            for handle in handles.drain(..) {
                handle.abort();
            }
        }

        info!("Dispatcher stopped");
    }

    /// Number of workers currently processing a job
    pub fn active_workers(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    pub async fn queue_depth(&self) -> Result<i64, QueueError> {
        self.queue.depth().await
    }
}
