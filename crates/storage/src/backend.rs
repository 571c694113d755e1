use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as StorePath;
use object_store::ObjectStore;
use tracing::info;

use lookout_core::config::AwsConfig;

use crate::error::StorageError;

/// Unified storage backend wrapping object_store.
///
/// Local and in-memory backends lay buckets out as top-level directories, so
/// `(bucket, key)` maps to `<bucket>/<key>`. The S3 backend keeps one store
/// per bucket and addresses objects by key alone.
pub enum StorageBackend {
    Local(LocalBackend),
    Memory(Arc<InMemory>),
    S3(S3Backend),
}

impl StorageBackend {
    pub fn in_memory() -> Self {
        StorageBackend::Memory(Arc::new(InMemory::new()))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageBackend::S3(_))
    }

    /// Store and in-store path for an object.
    pub fn locate(&self, bucket: &str, key: &str) -> Result<(Arc<dyn ObjectStore>, StorePath), StorageError> {
        let key = key.trim_start_matches('/');
        match self {
            StorageBackend::Local(b) => Ok((b.store.clone(), StorePath::from(format!("{bucket}/{key}")))),
            StorageBackend::Memory(m) => Ok((m.clone(), StorePath::from(format!("{bucket}/{key}")))),
            StorageBackend::S3(b) => Ok((b.bucket_store(bucket)?, StorePath::from(key))),
        }
    }

    /// Prefix that `locate` puts in front of keys, stripped again when listing.
    pub fn key_prefix(&self, bucket: &str) -> String {
        match self {
            StorageBackend::S3(_) => String::new(),
            _ => format!("{bucket}/"),
        }
    }
}

/// Local filesystem backend.
pub struct LocalBackend {
    pub store: Arc<dyn ObjectStore>,
    pub root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root)?;
        let canonical = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let store = LocalFileSystem::new_with_prefix(&canonical)
            .map_err(|e| StorageError::Other(format!("local filesystem error: {e}")))?;
        info!("Storage: local backend at {}", canonical.display());
        Ok(Self {
            store: Arc::new(store),
            root: canonical,
        })
    }
}

/// S3 backend. Stores are built lazily, one per bucket.
pub struct S3Backend {
    aws: AwsConfig,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl S3Backend {
    pub fn new(aws: &AwsConfig) -> Self {
        info!("Storage: S3 backend (region: {})", aws.region);
        Self {
            aws: aws.clone(),
            stores: Mutex::new(HashMap::new()),
        }
    }

    fn bucket_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| StorageError::Other("S3 store cache poisoned".into()))?;
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }
        let store: Arc<dyn ObjectStore> = Arc::new(self.build(bucket)?);
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    fn build(&self, bucket: &str) -> Result<object_store::aws::AmazonS3, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::NotConfigured("empty bucket name".into()));
        }
        let aws = &self.aws;
        let mut builder = AmazonS3Builder::new()
            .with_region(&aws.region)
            .with_bucket_name(bucket);

        if let Some(ref key) = aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = aws.session_token {
            builder = builder.with_token(token);
        }

        if let Some(ref endpoint) = aws.endpoint_url {
            if !endpoint.is_empty() {
                // object_store requires an absolute URL
                let endpoint_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    endpoint.clone()
                } else {
                    format!("https://{}", endpoint)
                };
                builder = builder
                    .with_endpoint(&endpoint_url)
                    .with_allow_http(endpoint_url.starts_with("http://"));
            }
        }

        Ok(builder.build()?)
    }
}
