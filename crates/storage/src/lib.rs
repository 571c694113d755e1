//! Object storage capability: read result objects and list staged inputs.

pub mod backend;
pub mod error;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use tracing::debug;

use lookout_core::config::AwsConfig;
use lookout_core::ObjectRef;

pub use backend::{LocalBackend, S3Backend, StorageBackend};
pub use error::StorageError;

/// Read access to bucket/key addressed objects.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    async fn get_object(&self, object: &ObjectRef) -> Result<Bytes, StorageError>;

    /// Keys under `prefix` in `bucket`, sorted.
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// [`ObjectSource`] over a config-selected object_store backend.
pub struct StorageEngine {
    pub backend: StorageBackend,
}

impl StorageEngine {
    pub fn new(backend: StorageBackend) -> Self {
        Self { backend }
    }

    /// S3 using the given credentials and region.
    pub fn s3(aws: &AwsConfig) -> Self {
        Self::new(StorageBackend::S3(S3Backend::new(aws)))
    }

    /// Local directory where each bucket is a subdirectory.
    pub fn local(root: &Path) -> Result<Self, StorageError> {
        Ok(Self::new(StorageBackend::Local(LocalBackend::new(root)?)))
    }

    pub fn in_memory() -> Self {
        Self::new(StorageBackend::in_memory())
    }

    /// Write an object. Used to stage inputs and by tests; the scheduler
    /// itself only reads.
    pub async fn put_object(&self, object: &ObjectRef, body: Bytes) -> Result<(), StorageError> {
        let (store, path) = self.backend.locate(&object.bucket, &object.key)?;
        store.put(&path, body.into()).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectSource for StorageEngine {
    async fn get_object(&self, object: &ObjectRef) -> Result<Bytes, StorageError> {
        let (store, path) = self.backend.locate(&object.bucket, &object.key)?;
        let bytes = store.get(&path).await?.bytes().await?;
        debug!(object = %object, size = bytes.len(), "Fetched object");
        Ok(bytes)
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let (store, path) = self.backend.locate(bucket, prefix)?;
        let strip = self.backend.key_prefix(bucket);
        let list_prefix = (!path.as_ref().is_empty()).then_some(path);

        let mut stream = store.list(list_prefix.as_ref());
        let mut keys = Vec::new();
        while let Some(meta) = stream.try_next().await? {
            let location = meta.location.to_string();
            keys.push(
                location
                    .strip_prefix(&strip)
                    .map(str::to_string)
                    .unwrap_or(location),
            );
        }
        keys.sort();
        debug!(bucket = %bucket, prefix = %prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }
}
