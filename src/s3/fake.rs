use crate::s3::error::StorageError;
use crate::s3::storage::BlobStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `FakeBlobStore` is an in-memory implementation of the `BlobStore` trait for
/// testing purposes. It allows simulating storage scenarios including
/// transient put failures and missing objects.
#[derive(Clone)]
pub struct FakeBlobStore {
    data: Arc<Mutex<HashMap<String, Bytes>>>,
    fail_get: Arc<Mutex<HashMap<String, bool>>>,
    // key prefix -> number of puts to fail before succeeding
    fail_put_prefix: Arc<Mutex<HashMap<String, u32>>>,
    put_counts: Arc<Mutex<HashMap<String, u32>>>,
}

#[allow(dead_code)]
impl FakeBlobStore {
    pub fn new() -> Self {
        FakeBlobStore {
            data: Arc::new(Mutex::new(HashMap::new())),
            fail_get: Arc::new(Mutex::new(HashMap::new())),
            fail_put_prefix: Arc::new(Mutex::new(HashMap::new())),
            put_counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Simulate a missing/unreadable object for a specific key
    pub async fn fake_fail_get(&self, key: &str) {
        let mut fail_get = self.fail_get.lock().await;
        fail_get.insert(key.to_string(), true);
    }

    /// Fail the next `count` puts whose key starts with `prefix`
    pub async fn fake_fail_puts_with_prefix(&self, prefix: &str, count: u32) {
        let mut fail = self.fail_put_prefix.lock().await;
        fail.insert(prefix.to_string(), count);
    }

    /// Number of puts observed for a key (idempotence instrumentation)
    pub async fn put_count(&self, key: &str) -> u32 {
        let counts = self.put_counts.lock().await;
        counts.get(key).copied().unwrap_or(0)
    }

    /// Whether an object exists under the key
    pub async fn has_object(&self, key: &str) -> bool {
        let data = self.data.lock().await;
        data.contains_key(key)
    }

    /// Count of stored objects under a key prefix
    pub async fn object_count_with_prefix(&self, prefix: &str) -> usize {
        let data = self.data.lock().await;
        data.keys().filter(|k| k.starts_with(prefix)).count()
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        {
            let mut counts = self.put_counts.lock().await;
            *counts.entry(key.to_string()).or_insert(0) += 1;
        }

        {
            let mut fail = self.fail_put_prefix.lock().await;
            let matched: Option<String> = fail
                .iter()
                .find(|(prefix, remaining)| key.starts_with(prefix.as_str()) && **remaining > 0)
                .map(|(prefix, _)| prefix.to_string());
            if let Some(prefix) = matched {
                *fail.get_mut(&prefix).expect("prefix present") -= 1;
                return Err(StorageError::WriteError(
                    key.to_string(),
                    "injected put failure".to_string(),
                ));
            }
        }

        let mut storage_data = self.data.lock().await;
        storage_data.insert(key.to_string(), data);
        Ok(format!("s3://fake-bucket/{}", key))
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let fail_get = self.fail_get.lock().await;
        if fail_get.get(key).copied().unwrap_or(false) {
            return Err(StorageError::ObjectNotFound(key.to_string()));
        }

        let data = self.data.lock().await;
        match data.get(key) {
            Some(bytes) => Ok(bytes.clone()),
            None => Err(StorageError::ObjectNotFound(key.to_string())),
        }
    }
}

impl Default for FakeBlobStore {
    fn default() -> Self {
        Self::new()
    }
}
