pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod retry;
pub mod service;
pub mod stats;
pub mod status;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use error::PipelineError;
pub use gate::{AdmissionGate, BatchOutcome, RejectReason, SubmitOutcome};
pub use service::Pipeline;
pub use stats::StatsAggregator;
pub use status::{HealthReport, JobStatusView, PipelineStats, QueueStatus};
pub use worker::Worker;
