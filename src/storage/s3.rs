use super::{Storage, StorageError, tree_prefix};
use futures::TryStreamExt;
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutMode, PutOptions, PutPayload};
use std::env;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Storage in an S3 bucket, or any other [`ObjectStore`].
///
/// The [`Storage`] trait is blocking, so requests run on a small private
/// Tokio runtime. Do not call it from inside another async runtime.
///
/// Saves use a create-only conditional PUT, so a lost race surfaces as
/// [`StorageError::AlreadyExists`] and the winner's object is kept.
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    /// Key prefix inside the bucket, without surrounding `/`.
    prefix: String,
    runtime: Runtime,
}

impl S3Storage {
    /// Connect to `bucket`. Credentials and anything not given here come
    /// from the usual `AWS_*` environment variables. An endpoint, passed in
    /// or from `AWS_ENDPOINT_URL`, points at an S3-compatible server.
    pub fn new(
        bucket: &str,
        region: Option<&str>,
        endpoint: Option<&str>,
        prefix: &str,
    ) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_conditional_put(S3ConditionalPut::ETagMatch);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        let endpoint = endpoint
            .map(str::to_string)
            .or_else(|| env::var("AWS_ENDPOINT_URL").ok());
        if let Some(endpoint) = endpoint {
            if endpoint.starts_with("http://") {
                builder = builder.with_allow_http(true);
            }
            builder = builder.with_endpoint(endpoint);
        }
        tracing::debug!(bucket, prefix, "connecting to object storage");
        Self::with_store(Arc::new(builder.build()?), prefix)
    }

    /// Wrap an already built store.
    pub fn with_store(store: Arc<dyn ObjectStore>, prefix: &str) -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("resize-cache-s3")
            .enable_all()
            .build()?;
        Ok(Self {
            store,
            prefix: tree_prefix(prefix).trim_start_matches('/').to_string(),
            runtime,
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn path(&self, key: &str) -> Result<Path, StorageError> {
        if key.starts_with('/') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let full = if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.prefix)
        };
        Path::parse(&full).map_err(|_| StorageError::InvalidKey(key.to_string()))
    }

    /// Strip the bucket prefix from a listed location.
    fn key_for(&self, location: &Path) -> Option<String> {
        let location: &str = location.as_ref();
        if self.prefix.is_empty() {
            return Some(location.to_string());
        }
        location
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('/')
            .map(str::to_string)
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        let dir = tree_prefix(prefix);
        let base = match (dir.is_empty(), self.prefix.is_empty()) {
            (true, true) => None,
            (true, false) => Some(
                Path::parse(&self.prefix)
                    .map_err(|_| StorageError::InvalidKey(self.prefix.clone()))?,
            ),
            (false, _) => Some(self.path(dir)?),
        };
        let metas: Vec<ObjectMeta> =
            self.block_on(self.store.list(base.as_ref()).try_collect())?;
        Ok(metas)
    }
}

fn not_found_or(err: object_store::Error, key: &str) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound(key.to_string()),
        object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. } => {
            StorageError::AlreadyExists(key.to_string())
        }
        other => StorageError::ObjectStore(other),
    }
}

impl Storage for S3Storage {
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        if key.is_empty() {
            return Ok(false);
        }
        let path = self.path(key)?;
        match self.block_on(self.store.head(&path)) {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        if key.is_empty() {
            return Err(StorageError::NotFound(String::new()));
        }
        let path = self.path(key)?;
        self.block_on(async { self.store.get(&path).await?.bytes().await })
            .map(|bytes| bytes.to_vec())
            .map_err(|e| not_found_or(e, key))
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(String::new()));
        }
        let path = self.path(key)?;
        let opts = PutOptions {
            mode: PutMode::Create,
            ..PutOptions::default()
        };
        self.block_on(
            self.store
                .put_opts(&path, PutPayload::from(data.to_vec()), opts),
        )
        .map(|_| ())
        .map_err(|e| not_found_or(e, key))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        // S3 deletes succeed for missing objects.
        if !self.exists(key)? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let path = self.path(key)?;
        self.block_on(self.store.delete(&path))
            .map_err(|e| not_found_or(e, key))
    }

    fn list_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .list(prefix)?
            .iter()
            .filter_map(|meta| self.key_for(&meta.location))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn delete_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut deleted = Vec::new();
        for meta in self.list(prefix)? {
            self.block_on(self.store.delete(&meta.location))?;
            if let Some(key) = self.key_for(&meta.location) {
                deleted.push(key);
            }
        }
        deleted.sort();
        Ok(deleted)
    }
}
