use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

mod config;
mod db;
mod logging;
mod model;
mod pipeline;
mod queue;
mod s3;
#[cfg(test)]
mod test_utils;

use crate::db::{PostgresMetadataStore, RecordFilters};
use crate::model::{ModelManager, ModelProvider, StubModelProvider};
use crate::pipeline::{Pipeline, SubmitOutcome};
use crate::queue::PostgresJobQueue;
use crate::s3::S3BlobStore;

type ProductionPipeline = Pipeline<PostgresJobQueue, S3BlobStore, PostgresMetadataStore>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.toml",
        global = true
    )]
    config: String,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the log file
    #[arg(
        long,
        value_name = "FILE",
        default_value = "logs/carblur.log",
        global = true
    )]
    log_file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the admission gate and worker pool
    Serve,
    /// Create the metadata table and the queue backing table
    InitDb,
    /// Submit one or more image files for processing
    Submit {
        /// Image files to submit
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the status of a job
    Status {
        /// The job id returned at submission
        job_id: Uuid,
    },
    /// List job records filtered by detection flags
    Query {
        #[arg(long)]
        vehicle: Option<bool>,
        #[arg(long)]
        face: Option<bool>,
        #[arg(long)]
        blurred: Option<bool>,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    /// Print live and durable statistics, queue status, and health
    Stats,
}

const STARTUP_RETRIES: u32 = 5;

fn main() {
    // Worker-task panics are contained at the loop boundary; anything that
    // unwinds this far is unrecoverable and maps to exit code 2.
    match std::panic::catch_unwind(run) {
        Ok(code) => process::exit(code),
        Err(_) => {
            eprintln!("carblur: unrecoverable panic");
            process::exit(2);
        }
    }
}

#[tokio::main]
async fn run() -> i32 {
    let cli = Cli::parse();

    let config = match config::load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return 1;
        }
    };

    let _log_guard = match logging::init_logging(&cli.log_file, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return 1;
        }
    };

    info!("carblur-pipeline v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::InitDb => init_db(config).await,
        Commands::Submit { files } => submit(config, files).await,
        Commands::Status { job_id } => status(config, job_id).await,
        Commands::Query {
            vehicle,
            face,
            blurred,
            limit,
        } => query(config, vehicle, face, blurred, limit).await,
        Commands::Stats => stats(config).await,
    }
}

async fn serve(config: config::Config) -> i32 {
    let Some(pipeline) = build_pipeline(&config).await else {
        return 1;
    };

    pipeline.start().await;
    let health = pipeline.health().await;
    info!(
        "Pipeline serving with {} workers (healthy: {}); press Ctrl-C to stop",
        config.pipeline.num_workers, health.healthy
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutdown signal received, draining in-flight work");
    pipeline.shutdown().await;
    0
}

async fn init_db(config: config::Config) -> i32 {
    let Some(queue) = with_retries("queue", || PostgresJobQueue::new(&config.queue)).await else {
        return 1;
    };
    if let Err(e) = queue.create_schema().await {
        error!("Failed to create queue schema: {}", e);
        return 1;
    }

    let Some(metadata) =
        with_retries("metadata store", || PostgresMetadataStore::new(&config.metadata)).await
    else {
        return 1;
    };
    if let Err(e) = metadata.create_schema().await {
        error!("Failed to create metadata schema: {}", e);
        return 1;
    }

    info!("Database schemas initialized");
    0
}

async fn submit(config: config::Config, files: Vec<PathBuf>) -> i32 {
    let Some(pipeline) = build_pipeline(&config).await else {
        return 1;
    };

    if let [file] = files.as_slice() {
        let (data, filename, content_type) = match read_image_file(file) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("Failed to read {}: {}", file.display(), e);
                return 1;
            }
        };

        match pipeline.submit(data, &filename, &content_type).await {
            Ok(SubmitOutcome::Accepted { job_id }) => {
                println!("accepted {}", job_id);
                return 0;
            }
            Ok(SubmitOutcome::Rejected { reason }) => {
                println!("rejected ({})", reason.as_str());
                return 0;
            }
            Err(e) => {
                error!("Submission failed: {}", e);
                return 1;
            }
        }
    }

    let mut batch = Vec::with_capacity(files.len());
    for file in &files {
        match read_image_file(file) {
            Ok(loaded) => batch.push(loaded),
            Err(e) => {
                error!("Failed to read {}: {}", file.display(), e);
                return 1;
            }
        }
    }

    match pipeline.submit_batch(batch).await {
        Ok(outcome) => {
            println!(
                "accepted {} of {} (no-vehicle: {}, invalid: {}, unavailable: {})",
                outcome.accepted.len(),
                files.len(),
                outcome.rejected_no_vehicle,
                outcome.invalid,
                outcome.unavailable
            );
            for job_id in outcome.accepted {
                println!("{}", job_id);
            }
            0
        }
        Err(e) => {
            error!("Batch submission failed: {}", e);
            1
        }
    }
}

async fn status(config: config::Config, job_id: Uuid) -> i32 {
    let Some(pipeline) = build_pipeline(&config).await else {
        return 1;
    };

    match pipeline.get_status(job_id).await {
        Ok(Some(view)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&view).expect("status view serializes")
            );
            0
        }
        Ok(None) => {
            println!("job {} not found", job_id);
            0
        }
        Err(e) => {
            error!("Failed to fetch status: {}", e);
            1
        }
    }
}

async fn query(
    config: config::Config,
    vehicle: Option<bool>,
    face: Option<bool>,
    blurred: Option<bool>,
    limit: u32,
) -> i32 {
    let Some(pipeline) = build_pipeline(&config).await else {
        return 1;
    };

    let filters = RecordFilters {
        is_vehicle_detected: vehicle,
        is_face_detected: face,
        is_face_blurred: blurred,
    };

    match pipeline.query(&filters, limit).await {
        Ok(views) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&views).expect("views serialize")
            );
            0
        }
        Err(e) => {
            error!("Query failed: {}", e);
            1
        }
    }
}

async fn stats(config: config::Config) -> i32 {
    let Some(pipeline) = build_pipeline(&config).await else {
        return 1;
    };

    let stats = match pipeline.stats().await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to read stats: {}", e);
            return 1;
        }
    };
    let queue_status = pipeline.queue_status().await;
    let health = pipeline.health().await;

    let report = serde_json::json!({
        "stats": stats,
        "queue": queue_status,
        "health": health,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).expect("report serializes")
    );
    0
}

/// Connect every adapter (with startup retries) and assemble the pipeline
async fn build_pipeline(config: &config::Config) -> Option<ProductionPipeline> {
    let queue = with_retries("queue", || PostgresJobQueue::new(&config.queue)).await?;
    let metadata =
        with_retries("metadata store", || PostgresMetadataStore::new(&config.metadata)).await?;
    let blobs = with_retries("blob store", || S3BlobStore::new(&config.blob)).await?;

    let provider: Box<dyn ModelProvider> = match config.models.provider.as_str() {
        "stub" => Box::new(StubModelProvider),
        other => {
            error!("Unknown model provider: {}", other);
            return None;
        }
    };
    let models = Arc::new(ModelManager::new(provider, &config.models));

    match Pipeline::new(
        config,
        Arc::new(queue),
        Arc::new(blobs),
        Arc::new(metadata),
        models,
    ) {
        Ok(pipeline) => Some(pipeline),
        Err(e) => {
            error!("Failed to build pipeline: {}", e);
            None
        }
    }
}

fn read_image_file(path: &Path) -> Result<(Bytes, String, String), std::io::Error> {
    let data = std::fs::read(path)?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let content_type = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
    .to_string();

    Ok((data.into(), filename, content_type))
}

/// Initialize an adapter, retrying with exponential backoff. Exhaustion is an
/// unrecoverable startup failure.
async fn with_retries<T, E, F, Fut>(name: &str, mut op: F) -> Option<T>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    for attempt in 0..STARTUP_RETRIES {
        match op().await {
            Ok(value) => return Some(value),
            Err(e) => {
                error!(
                    "Failed to initialize {} (attempt {}/{}): {}",
                    name,
                    attempt + 1,
                    STARTUP_RETRIES,
                    e
                );
            }
        }

        if attempt + 1 < STARTUP_RETRIES {
            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
        }
    }

    None
}
