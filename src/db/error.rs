use thiserror::Error;

/// Errors that can occur when interacting with the metadata store
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to connect to metadata store: {0}")]
    ConnectionError(String),

    #[error("Query execution failed: {0}")]
    QueryError(String),

    #[error("Duplicate job record: {0}")]
    Duplicate(String),

    #[error("Job record not found: {0}")]
    NotFound(String),

    #[error("Failed to deserialize database row: {0}")]
    DeserializationError(String),

    #[error("Other metadata store error: {0}")]
    Other(#[from] anyhow::Error),
}
