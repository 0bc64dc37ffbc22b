use crate::config::BlobConfig;
use crate::s3::error::StorageError;
use crate::s3::storage::BlobStore;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const GET_CACHE_ENTRIES: usize = 100;

/// S3 implementation of the BlobStore trait.
///
/// A small LRU keeps recently staged payloads out of repeat GETs; workers
/// usually fetch a staged payload moments after the gate wrote it.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    cache: Arc<Mutex<lru::LruCache<String, Bytes>>>,
}

impl S3BlobStore {
    /// Create a new S3BlobStore from configuration.
    ///
    /// Credentials and region resolve through the standard AWS environment
    /// chain; explicit keys in the config take precedence. An endpoint
    /// override points the client at MinIO or another S3-compatible store.
    pub async fn new(config: &BlobConfig) -> Result<Self, StorageError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "BlobConfig",
            ));
        }

        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config)
            // MinIO and friends require path-style requests
            .force_path_style(true);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(
            "Blob store ready: bucket={}, region={}, endpoint={:?}",
            config.bucket, config.region, config.endpoint
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            cache: Arc::new(Mutex::new(lru::LruCache::new(
                NonZeroUsize::new(GET_CACHE_ENTRIES).expect("cache size is non-zero"),
            ))),
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    async fn cache_lookup(&self, key: &str) -> Option<Bytes> {
        self.cache.lock().await.get(key).cloned()
    }

    async fn cache_insert(&self, key: &str, data: Bytes) {
        self.cache.lock().await.put(key.to_string(), data);
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        debug!("Uploading object to S3: {} ({} bytes)", key, data.len());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(data.clone().into())
            .send()
            .await
            .map_err(|e| match e.code() {
                Some("AccessDenied") => StorageError::AccessDenied(key.to_string(), e.to_string()),
                _ => StorageError::WriteError(key.to_string(), e.to_string()),
            })?;

        self.cache_insert(key, data).await;
        Ok(self.url_for(key))
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        if let Some(data) = self.cache_lookup(key).await {
            debug!("Cache hit for object: {}", key);
            return Ok(data);
        }

        debug!("Fetching object from S3: {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.code() {
                Some("NoSuchKey") | Some("NotFound") => {
                    StorageError::ObjectNotFound(key.to_string())
                }
                Some("AccessDenied") => StorageError::AccessDenied(key.to_string(), e.to_string()),
                _ => StorageError::ReadError(key.to_string(), e.to_string()),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::ReadError(key.to_string(), e.to_string()))?
            .into_bytes();

        self.cache_insert(key, data.clone()).await;
        Ok(data)
    }
}
