use thiserror::Error;

/// Errors raised by the orchestration layer itself.
///
/// Adapter failures are not errors here: the gate folds them into submission
/// outcomes and the worker folds them into retry or failure decisions.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    Config(String),

    #[error("Internal pipeline error: {0}")]
    Internal(String),
}
