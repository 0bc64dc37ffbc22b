use thiserror::Error;

/// Errors that can occur when interacting with the job queue
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue backing store unavailable: {0}")]
    Unavailable(String),

    #[error("Queue depth {depth} at or above configured maximum {max}")]
    Backpressure { depth: i64, max: i64 },

    #[error("Failed to serialize envelope: {0}")]
    Serialization(String),

    #[error("Other queue error: {0}")]
    Other(#[from] anyhow::Error),
}
