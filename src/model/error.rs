use thiserror::Error;

/// Errors that can occur while running the detection models
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to load models: {0}")]
    Load(String),

    #[error("Model inference failed: {0}")]
    Inference(String),

    #[error("Model returned structurally invalid output: {0}")]
    InvalidOutput(String),

    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}
