use crate::s3::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// BlobStore trait defining the interface for object storage.
///
/// `put` must be idempotent: re-writing identical bytes under the same key
/// returns the same URL, so a retried upload cannot fork artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Store an object and return its URL
    async fn put(&self, key: &str, data: Bytes, content_type: &str)
        -> Result<String, StorageError>;

    /// Get an object by its key
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;
}

/// Implementation of BlobStore trait for Arc<T> where T implements BlobStore
///
/// This allows sharing storage instances across threads and components
/// efficiently.
#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        (**self).put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        (**self).get(key).await
    }
}
