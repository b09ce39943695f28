//! Object storage client for band sources.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};

/// Read access to named objects.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the full contents of `key`.
    async fn get_object(&self, key: &str) -> StorageResult<Bytes>;
}

/// Where source objects live.
///
/// With `local_root` set the bucket settings are ignored and keys resolve
/// to files under that directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStorageConfig {
    pub bucket: String,
    pub region: String,
    /// Custom S3 endpoint (e.g. a MinIO mirror)
    pub endpoint: Option<String>,
    /// Allow plain HTTP endpoints
    pub allow_http: bool,
    /// Skip request signing; the NOAA open-data buckets need no credentials
    pub anonymous: bool,
    pub local_root: Option<PathBuf>,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            bucket: "noaa-rtma-pds".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            allow_http: false,
            anonymous: true,
            local_root: None,
        }
    }
}

/// Object storage client.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    /// Bucket name or local root, for logging
    label: String,
}

impl ObjectStorage {
    pub fn new(config: &ObjectStorageConfig) -> StorageResult<Self> {
        if let Some(root) = &config.local_root {
            let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
                StorageError::Config(format!("Failed to open {}: {}", root.display(), e))
            })?;
            return Ok(Self::from_store(
                Arc::new(store),
                root.display().to_string(),
            ));
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_skip_signature(config.anonymous);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self::from_store(Arc::new(store), config.bucket.clone()))
    }

    pub fn from_store(store: Arc<dyn ObjectStore>, label: impl Into<String>) -> Self {
        Self {
            store,
            label: label.into(),
        }
    }

    /// Empty in-memory store.
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemory::new()), "memory")
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Write bytes to a key.
    #[instrument(skip(self, key, data), fields(store = %self.label, key = %key))]
    pub async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        debug!(size = data.len(), "Writing object");
        self.store
            .put(&Path::from(key), data.into())
            .await
            .map_err(|e| map_error(key, e))?;
        Ok(())
    }

    /// Read bytes from a key.
    #[instrument(skip(self, key), fields(store = %self.label, key = %key))]
    pub async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let location = Path::from(key);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| map_error(key, e))?;
        let bytes = result.bytes().await.map_err(|e| map_error(key, e))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }
}

#[async_trait]
impl BlobStore for ObjectStorage {
    async fn get_object(&self, key: &str) -> StorageResult<Bytes> {
        self.get(key).await
    }
}

/// NotFound is final; every other backend error is treated as retryable.
fn map_error(key: &str, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound {
            key: key.to_string(),
        },
        other => StorageError::Transient {
            key: key.to_string(),
            message: other.to_string(),
        },
    }
}
