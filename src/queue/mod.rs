pub mod envelope;
pub mod error;
#[cfg(test)]
pub mod fake;
pub mod postgres;
pub mod queue;
#[cfg(test)]
mod tests;

pub use envelope::{Delivery, JobEnvelope, PayloadRef};
pub use error::QueueError;
#[cfg(test)]
pub use fake::FakeJobQueue;
pub use postgres::PostgresJobQueue;
pub use queue::JobQueue;
