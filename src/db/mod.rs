pub mod error;
#[cfg(test)]
pub mod fake;
pub mod models;
pub mod postgres;
pub mod store;
#[cfg(test)]
mod tests;

pub use error::MetadataError;
#[cfg(test)]
pub use fake::FakeMetadataStore;
pub use models::{AggregateStats, JobRecord, JobStatus, RecordFilters};
pub use postgres::PostgresMetadataStore;
pub use store::MetadataStore;
