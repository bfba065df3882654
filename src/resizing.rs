//! Resize coordination: one target per request, one façade per deployment.
//!
//! [`ResizeTarget`] owns a single validated request and its unique key, and
//! walks the lookup state machine:
//!
//! ```text
//! Validated ─▶ get_cached_path ─ Hit ──────────────────────────▶ done
//!                   │ Miss
//!                   ▼
//!              get_path ──────── Found (cache back-filled) ────▶ done
//!                   │ NotFound
//!                   ▼
//!              generate ──────── lock held elsewhere ──▶ GenerateInProgress
//!                   │ lock acquired
//!                   ▼
//!     load source → decode → transform → encode → save → cache.add
//!                   │ any failure
//!                   ▼
//!     delete partial blob, cache.remove, return the original error
//! ```
//!
//! The generation lock is a [`GenerationLock`] guard, so it is released on
//! every exit path of [`ResizeTarget::generate`].
//!
//! [`Resizer`] is the stateless façade: it strips the base URL, builds a
//! target, runs the two-tier lookup and turns the resolved key into a public
//! URL. Backends are injected explicitly; there is no shared default cache.

use crate::cache::{Cache, CacheError, DEFAULT_LOCK_TTL, GenerationLock};
use crate::imaging::calculations::placeholder_dimensions;
use crate::imaging::{BackendError, DecodedImage, EncodeParams, ImageBackend, TransformParams};
use crate::key::{DEFAULT_TARGET_DIRECTORY, HashMethod, UniqueKey, derive_unique_key};
use crate::params::ValidationError;
use crate::request::{TransformOptions, TransformRequest};
use crate::storage::{Storage, StorageError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResizeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error("Source image `{0}` not found")]
    ImageNotFound(String),
    #[error("Generation of `{0}` is already in progress")]
    GenerateInProgress(String),
    #[error("`{0}` is missing from storage right after being generated")]
    MissingAfterGenerate(String),
}

/// Result of asking the cache about a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(UniqueKey),
    Miss,
}

/// Result of asking storage about a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLookup {
    Found(UniqueKey),
    NotFound,
}

/// Settings shared by every target a [`Resizer`] creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizerSettings {
    /// Public URL prefix of generated images. Always ends with `/` once it
    /// has gone through [`Resizer::new`].
    pub base_url: String,
    /// Return input URLs unchanged without validating anything.
    pub noop: bool,
    pub hash_method: HashMethod,
    pub target_directory: String,
    pub lock_ttl: Duration,
    /// Surface contention instead of resolving to the not-yet-written key.
    pub raise_on_generate_in_progress: bool,
    /// Add keys found in storage but missing from the cache.
    pub repair_cache_on_storage_hit: bool,
}

impl Default for ResizerSettings {
    fn default() -> Self {
        Self {
            base_url: "/".to_string(),
            noop: false,
            hash_method: HashMethod::default(),
            target_directory: DEFAULT_TARGET_DIRECTORY.to_string(),
            lock_ttl: DEFAULT_LOCK_TTL,
            raise_on_generate_in_progress: false,
            repair_cache_on_storage_hit: true,
        }
    }
}

/// Borrowed backends a target works against.
#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub storage: &'a dyn Storage,
    pub cache: &'a dyn Cache,
    pub images: &'a dyn ImageBackend,
}

enum Source {
    Bytes(Vec<u8>),
    Placeholder(DecodedImage),
}

/// The lifecycle of one derivative of one source image.
pub struct ResizeTarget<'a> {
    backends: Backends<'a>,
    request: TransformRequest,
    unique_key: UniqueKey,
    lock_ttl: Duration,
    repair_cache: bool,
}

impl<'a> ResizeTarget<'a> {
    pub fn new(
        backends: Backends<'a>,
        request: TransformRequest,
        settings: &ResizerSettings,
    ) -> Self {
        let unique_key =
            derive_unique_key(&request, settings.hash_method, &settings.target_directory);
        Self {
            backends,
            request,
            unique_key,
            lock_ttl: settings.lock_ttl,
            repair_cache: settings.repair_cache_on_storage_hit,
        }
    }

    pub fn request(&self) -> &TransformRequest {
        &self.request
    }

    pub fn unique_key(&self) -> &UniqueKey {
        &self.unique_key
    }

    fn key(&self) -> &str {
        self.unique_key.as_str()
    }

    pub fn get_cached_path(&self) -> Result<CacheLookup, ResizeError> {
        if self.backends.cache.exists(self.key())? {
            tracing::debug!(key = self.key(), "fetched from cache");
            Ok(CacheLookup::Hit(self.unique_key.clone()))
        } else {
            tracing::debug!(key = self.key(), "not cached");
            Ok(CacheLookup::Miss)
        }
    }

    pub fn get_path(&self) -> Result<StorageLookup, ResizeError> {
        if !self.backends.storage.exists(self.key())? {
            return Ok(StorageLookup::NotFound);
        }
        if self.repair_cache && self.backends.cache.add(self.key())? {
            tracing::debug!(key = self.key(), "found non-cached image, added to cache");
        }
        Ok(StorageLookup::Found(self.unique_key.clone()))
    }

    /// Generate the derivative under the generation lock and return its
    /// encoded bytes.
    #[tracing::instrument(skip(self), fields(key = %self.unique_key))]
    pub fn generate(&self) -> Result<Vec<u8>, ResizeError> {
        let Some(_lock) = GenerationLock::acquire(self.backends.cache, self.key(), self.lock_ttl)?
        else {
            tracing::error!("generation already in progress");
            return Err(ResizeError::GenerateInProgress(self.key().to_string()));
        };

        // Another holder may have finished between our lookup and the lock.
        if self.backends.storage.exists(self.key())? {
            tracing::debug!("generated by another caller while waiting for the lock");
            self.backends.cache.add(self.key())?;
            return Ok(self.backends.storage.get(self.key())?);
        }

        tracing::info!(source = %self.request.source_path, "generating image");
        match self.render_and_store() {
            Ok(data) => Ok(data),
            Err(err) => {
                self.clean_up_after(&err);
                Err(err)
            }
        }
    }

    fn render_and_store(&self) -> Result<Vec<u8>, ResizeError> {
        let images = self.backends.images;
        let decoded = match self.load_source()? {
            Source::Bytes(bytes) => images.decode(&bytes, &self.request.source_format())?,
            Source::Placeholder(image) => image,
        };
        let image = if self.request.resizes() {
            images.transform(decoded, &TransformParams::from_request(&self.request))?
        } else {
            decoded
        };
        let data = images.encode(&image, &EncodeParams::from_request(&self.request))?;

        self.backends.storage.save(self.key(), &data)?;
        self.backends.cache.add(self.key())?;
        Ok(data)
    }

    fn load_source(&self) -> Result<Source, ResizeError> {
        let path = &self.request.source_path;
        match self.backends.storage.get(path) {
            Ok(bytes) => Ok(Source::Bytes(bytes)),
            Err(StorageError::NotFound(_)) if self.request.use_placeholder => {
                let message = format!("Source image `{path}` not found");
                self.placeholder(&message).map(Source::Placeholder)
            }
            Err(StorageError::NotFound(_)) => Err(ResizeError::ImageNotFound(path.clone())),
            Err(err) => Err(err.into()),
        }
    }

    fn placeholder(&self, message: &str) -> Result<DecodedImage, ResizeError> {
        let (width, height) = placeholder_dimensions(self.request.width, self.request.height)
            .ok_or_else(|| {
                ValidationError::MissingDimensions(
                    "a placeholder needs a width or a height".to_string(),
                )
            })?;
        tracing::info!(width, height, "rendering placeholder");
        let text = format!("{width}x{height} ({message})");
        Ok(self.backends.images.placeholder(width, height, &text)?)
    }

    /// Leave no trace of a failed attempt. Cleanup errors are logged and
    /// never replace `err`.
    fn clean_up_after(&self, err: &ResizeError) {
        if let ResizeError::Storage(StorageError::AlreadyExists(_)) = err {
            // Someone else's complete artifact; not ours to delete.
            tracing::warn!("image was written concurrently, keeping the existing one");
            return;
        }
        tracing::info!(error = %err, "generation failed, removing from cache and storage");

        match self.backends.storage.delete(self.key()) {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(cleanup) => {
                tracing::warn!(error = %cleanup, "failed to delete partial image during cleanup");
            }
        }
        if let Err(cleanup) = self.backends.cache.remove(self.key()) {
            tracing::warn!(error = %cleanup, "failed to remove key from cache during cleanup");
        }
    }
}

/// How a URL was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No-op mode, the input URL was returned unchanged.
    Passthrough,
    CacheHit,
    StorageHit,
    Generated,
    /// Another caller is generating the image; the URL may not resolve yet.
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub url: String,
    pub outcome: Outcome,
}

/// Resolves image URLs plus transform options into derivative URLs,
/// generating derivatives on demand.
pub struct Resizer {
    storage: Arc<dyn Storage>,
    cache: Arc<dyn Cache>,
    images: Arc<dyn ImageBackend>,
    settings: ResizerSettings,
}

impl Resizer {
    pub fn new(
        storage: Arc<dyn Storage>,
        cache: Arc<dyn Cache>,
        images: Arc<dyn ImageBackend>,
        mut settings: ResizerSettings,
    ) -> Self {
        if !settings.base_url.ends_with('/') {
            settings.base_url.push('/');
        }
        if !cache.is_cooperative() {
            tracing::debug!("cache does not coordinate generation; concurrent writers may race");
        }
        Self {
            storage,
            cache,
            images,
            settings,
        }
    }

    pub fn settings(&self) -> &ResizerSettings {
        &self.settings
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    fn backends(&self) -> Backends<'_> {
        Backends {
            storage: self.storage.as_ref(),
            cache: self.cache.as_ref(),
            images: self.images.as_ref(),
        }
    }

    /// Storage-relative path of `image_url`: the base URL prefix and then a
    /// single leading `/` are stripped.
    pub fn relative_path<'u>(&self, image_url: &'u str) -> &'u str {
        let path = image_url
            .strip_prefix(self.settings.base_url.as_str())
            .unwrap_or(image_url);
        path.strip_prefix('/').unwrap_or(path)
    }

    pub fn url_for(&self, key: &UniqueKey) -> String {
        format!("{}{}", self.settings.base_url, key)
    }

    /// Build the target for a request without touching any backend.
    pub fn target(
        &self,
        image_url: &str,
        options: &TransformOptions,
    ) -> Result<ResizeTarget<'_>, ResizeError> {
        let request = TransformRequest::new(self.relative_path(image_url), options)?;
        Ok(ResizeTarget::new(self.backends(), request, &self.settings))
    }

    /// Resolve `image_url` to the public URL of its derivative.
    pub fn resolve(
        &self,
        image_url: &str,
        options: &TransformOptions,
    ) -> Result<String, ResizeError> {
        self.resolve_detailed(image_url, options).map(|r| r.url)
    }

    /// Like [`resolve`](Self::resolve), also reporting which branch of the
    /// lookup produced the URL.
    pub fn resolve_detailed(
        &self,
        image_url: &str,
        options: &TransformOptions,
    ) -> Result<Resolved, ResizeError> {
        if self.settings.noop {
            return Ok(Resolved {
                url: image_url.to_string(),
                outcome: Outcome::Passthrough,
            });
        }

        let target = self.target(image_url, options)?;
        let (key, outcome) = self.lookup_or_generate(&target)?;
        Ok(Resolved {
            url: self.url_for(&key),
            outcome,
        })
    }

    fn lookup_or_generate(
        &self,
        target: &ResizeTarget<'_>,
    ) -> Result<(UniqueKey, Outcome), ResizeError> {
        if let CacheLookup::Hit(key) = target.get_cached_path()? {
            return Ok((key, Outcome::CacheHit));
        }
        if let StorageLookup::Found(key) = target.get_path()? {
            return Ok((key, Outcome::StorageHit));
        }
        match target.generate() {
            Ok(_) => match target.get_path()? {
                StorageLookup::Found(key) => Ok((key, Outcome::Generated)),
                StorageLookup::NotFound => Err(ResizeError::MissingAfterGenerate(
                    target.unique_key().to_string(),
                )),
            },
            Err(ResizeError::GenerateInProgress(_))
                if !self.settings.raise_on_generate_in_progress =>
            {
                Ok((target.unique_key().clone(), Outcome::InProgress))
            }
            // Without a cooperative lock a concurrent writer can publish first.
            Err(err @ ResizeError::Storage(StorageError::AlreadyExists(_))) => {
                match target.get_path()? {
                    StorageLookup::Found(key) => Ok((key, Outcome::StorageHit)),
                    StorageLookup::NotFound => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, NoopCache};
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::storage::MemoryStorage;
    use crate::test_helpers::{CountingStorage, mock_resizer};

    fn sized(dims: &str) -> TransformOptions {
        TransformOptions::sized(dims.parse().unwrap())
    }

    // =========================================================================
    // ResizeTarget lookups
    // =========================================================================

    #[test]
    fn target_lookups_miss_on_empty_backends() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let images = MockBackend::new();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let request = TransformRequest::new("a.png", &sized("100x50")).unwrap();
        let target = ResizeTarget::new(backends, request, &ResizerSettings::default());

        assert_eq!(target.get_cached_path().unwrap(), CacheLookup::Miss);
        assert_eq!(target.get_path().unwrap(), StorageLookup::NotFound);
    }

    #[test]
    fn get_path_backfills_cache() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let images = MockBackend::new();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let request = TransformRequest::new("a.png", &sized("100x50")).unwrap();
        let target = ResizeTarget::new(backends, request, &ResizerSettings::default());
        storage.save(target.unique_key().as_str(), b"x").unwrap();

        assert_eq!(
            target.get_path().unwrap(),
            StorageLookup::Found(target.unique_key().clone())
        );
        assert!(cache.exists(target.unique_key().as_str()).unwrap());
    }

    #[test]
    fn get_path_without_repair_leaves_cache_alone() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let images = MockBackend::new();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let settings = ResizerSettings {
            repair_cache_on_storage_hit: false,
            ..ResizerSettings::default()
        };
        let request = TransformRequest::new("a.png", &sized("100x50")).unwrap();
        let target = ResizeTarget::new(backends, request, &settings);
        storage.save(target.unique_key().as_str(), b"x").unwrap();

        assert!(matches!(target.get_path().unwrap(), StorageLookup::Found(_)));
        assert!(!cache.exists(target.unique_key().as_str()).unwrap());
    }

    // =========================================================================
    // generate
    // =========================================================================

    #[test]
    fn generate_writes_storage_and_cache() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let images = MockBackend::with_source_dimensions(400, 200);
        storage.save("a.png", b"source").unwrap();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let request = TransformRequest::new("a.png", &sized("100x100")).unwrap();
        let target = ResizeTarget::new(backends, request, &ResizerSettings::default());

        let data = target.generate().unwrap();
        assert_eq!(data, b"PNG 100x50");
        let key = target.unique_key().as_str();
        assert_eq!(storage.get(key).unwrap(), data);
        assert!(cache.exists(key).unwrap());

        let ops = images.get_operations();
        assert!(matches!(&ops[0], RecordedOp::Decode { len: 6, .. }));
        assert!(matches!(&ops[2], RecordedOp::Encode { format: "PNG", .. }));
    }

    #[test]
    fn generate_without_dimensions_skips_transform() {
        let storage = MemoryStorage::new();
        let cache = NoopCache;
        let images = MockBackend::new();
        storage.save("a.png", b"source").unwrap();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let options = TransformOptions {
            format: Some("jpg".to_string()),
            quality: 95,
            ..TransformOptions::default()
        };
        let request = TransformRequest::new("a.png", &options).unwrap();
        ResizeTarget::new(backends, request, &ResizerSettings::default())
            .generate()
            .unwrap();

        let ops = images.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(
            &ops[1],
            RecordedOp::Encode {
                format: "JPEG",
                quality: 95,
                ..
            }
        ));
    }

    #[test]
    fn generate_refuses_when_lock_is_held() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let images = MockBackend::new();
        storage.save("a.png", b"source").unwrap();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let request = TransformRequest::new("a.png", &sized("10")).unwrap();
        let target = ResizeTarget::new(backends, request, &ResizerSettings::default());
        let key = target.unique_key().as_str();

        assert!(cache.acquire_generation_lock(key, DEFAULT_LOCK_TTL).unwrap().is_some());
        assert!(matches!(
            target.generate(),
            Err(ResizeError::GenerateInProgress(k)) if k == key
        ));
        assert!(images.get_operations().is_empty());
        assert!(storage.get(key).is_err());
    }

    #[test]
    fn generate_releases_lock_after_success_and_failure() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let failing = MockBackend::failing_encode();
        storage.save("a.png", b"source").unwrap();
        let request = TransformRequest::new("a.png", &sized("10")).unwrap();
        let settings = ResizerSettings::default();

        let target = ResizeTarget::new(
            Backends {
                storage: &storage,
                cache: &cache,
                images: &failing,
            },
            request.clone(),
            &settings,
        );
        assert!(target.generate().is_err());
        let key = target.unique_key().as_str().to_string();
        let token = cache.acquire_generation_lock(&key, DEFAULT_LOCK_TTL).unwrap().unwrap();
        assert!(cache.release_generation_lock(&key, &token).unwrap());

        let working = MockBackend::new();
        let target = ResizeTarget::new(
            Backends {
                storage: &storage,
                cache: &cache,
                images: &working,
            },
            request,
            &settings,
        );
        target.generate().unwrap();
        assert!(cache.acquire_generation_lock(&key, DEFAULT_LOCK_TTL).unwrap().is_some());
    }

    #[test]
    fn failed_render_leaves_no_trace() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let images = MockBackend::failing_encode();
        storage.save("a.png", b"source").unwrap();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let request = TransformRequest::new("a.png", &sized("10")).unwrap();
        let target = ResizeTarget::new(backends, request, &ResizerSettings::default());

        assert!(matches!(
            target.generate(),
            Err(ResizeError::Imaging(BackendError::ProcessingFailed(_)))
        ));
        let key = target.unique_key().as_str();
        assert!(!storage.exists(key).unwrap());
        assert!(!cache.exists(key).unwrap());
    }

    #[test]
    fn generate_missing_source_is_not_found() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let images = MockBackend::new();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let request = TransformRequest::new("missing.png", &sized("10")).unwrap();
        let target = ResizeTarget::new(backends, request, &ResizerSettings::default());

        assert!(matches!(
            target.generate(),
            Err(ResizeError::ImageNotFound(p)) if p == "missing.png"
        ));
        assert!(storage.is_empty());
    }

    #[test]
    fn generate_placeholder_for_missing_source() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let images = MockBackend::new();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let options = TransformOptions {
            placeholder: true,
            ..sized("100")
        };
        let request = TransformRequest::new("missing.png", &options).unwrap();
        let target = ResizeTarget::new(backends, request, &ResizerSettings::default());

        assert_eq!(target.generate().unwrap(), b"PNG 100x100");
        let ops = images.get_operations();
        assert_eq!(
            ops[0],
            RecordedOp::Placeholder {
                width: 100,
                height: 100,
                text: "100x100 (Source image `missing.png` not found)".to_string(),
            }
        );
        assert!(!ops.iter().any(|op| matches!(op, RecordedOp::Decode { .. })));
    }

    #[test]
    fn placeholder_without_dimensions_fails_and_cleans_up() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let images = MockBackend::new();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let options = TransformOptions {
            placeholder: true,
            ..TransformOptions::default()
        };
        let request = TransformRequest::new("", &options).unwrap();
        let target = ResizeTarget::new(backends, request, &ResizerSettings::default());

        assert!(matches!(
            target.generate(),
            Err(ResizeError::Validation(ValidationError::MissingDimensions(_)))
        ));
        assert!(!cache.exists(target.unique_key().as_str()).unwrap());
    }

    #[test]
    fn generate_returns_stored_bytes_when_raced() {
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let images = MockBackend::new();
        let backends = Backends {
            storage: &storage,
            cache: &cache,
            images: &images,
        };
        let request = TransformRequest::new("a.png", &sized("10")).unwrap();
        let target = ResizeTarget::new(backends, request, &ResizerSettings::default());
        storage
            .save(target.unique_key().as_str(), b"already there")
            .unwrap();

        assert_eq!(target.generate().unwrap(), b"already there");
        assert!(images.get_operations().is_empty());
        assert!(cache.exists(target.unique_key().as_str()).unwrap());
    }

    // =========================================================================
    // Resizer
    // =========================================================================

    /// Storage where every derivative save loses to a writer that published
    /// the same key first.
    #[derive(Default)]
    struct BeatenToIt(MemoryStorage);

    impl Storage for BeatenToIt {
        fn exists(&self, key: &str) -> Result<bool, StorageError> {
            self.0.exists(key)
        }

        fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
            self.0.get(key)
        }

        fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
            self.0.save(key, data)?;
            Err(StorageError::AlreadyExists(key.to_string()))
        }

        fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.0.delete(key)
        }

        fn list_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            self.0.list_tree(prefix)
        }

        fn delete_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            self.0.delete_tree(prefix)
        }
    }

    #[test]
    fn losing_a_write_race_resolves_to_the_winner() {
        let storage = Arc::new(BeatenToIt::default());
        storage.0.save("a.png", b"source").unwrap();
        let resizer = mock_resizer(
            storage.clone(),
            Arc::new(NoopCache),
            ResizerSettings::default(),
        );

        let resolved = resizer.resolve_detailed("a.png", &sized("100x50")).unwrap();
        assert_eq!(resolved.outcome, Outcome::StorageHit);
        assert!(storage.exists(resolved.url.trim_start_matches('/')).unwrap());
    }

    #[test]
    fn already_exists_without_a_blob_is_still_an_error() {
        struct Refuses;

        impl Storage for Refuses {
            fn exists(&self, key: &str) -> Result<bool, StorageError> {
                Ok(key == "a.png")
            }

            fn get(&self, _key: &str) -> Result<Vec<u8>, StorageError> {
                Ok(b"source".to_vec())
            }

            fn save(&self, key: &str, _data: &[u8]) -> Result<(), StorageError> {
                Err(StorageError::AlreadyExists(key.to_string()))
            }

            fn delete(&self, key: &str) -> Result<(), StorageError> {
                Err(StorageError::NotFound(key.to_string()))
            }

            fn list_tree(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
                Ok(Vec::new())
            }

            fn delete_tree(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
                Ok(Vec::new())
            }
        }

        let resizer = mock_resizer(
            Arc::new(Refuses),
            Arc::new(NoopCache),
            ResizerSettings::default(),
        );
        assert!(matches!(
            resizer.resolve("a.png", &sized("100x50")),
            Err(ResizeError::Storage(StorageError::AlreadyExists(_)))
        ));
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let resizer = mock_resizer(
            Arc::new(MemoryStorage::new()),
            Arc::new(NoopCache),
            ResizerSettings {
                base_url: "http://cdn.example.com/media".to_string(),
                ..ResizerSettings::default()
            },
        );
        assert_eq!(resizer.settings().base_url, "http://cdn.example.com/media/");
    }

    #[test]
    fn relative_path_strips_base_url_and_one_slash() {
        let resizer = mock_resizer(
            Arc::new(MemoryStorage::new()),
            Arc::new(NoopCache),
            ResizerSettings {
                base_url: "http://cdn.example.com/".to_string(),
                ..ResizerSettings::default()
            },
        );
        assert_eq!(
            resizer.relative_path("http://cdn.example.com/a/b.png"),
            "a/b.png"
        );
        assert_eq!(resizer.relative_path("/a/b.png"), "a/b.png");
        assert_eq!(resizer.relative_path("//a.png"), "/a.png");
        assert_eq!(resizer.relative_path("a.png"), "a.png");
    }

    #[test]
    fn noop_mode_returns_input_unvalidated() {
        let resizer = mock_resizer(
            Arc::new(MemoryStorage::new()),
            Arc::new(NoopCache),
            ResizerSettings {
                noop: true,
                ..ResizerSettings::default()
            },
        );
        let options = TransformOptions {
            format: Some("gif".to_string()),
            ..TransformOptions::default()
        };
        let resolved = resizer.resolve_detailed("", &options).unwrap();
        assert_eq!(resolved.url, "");
        assert_eq!(resolved.outcome, Outcome::Passthrough);
    }

    #[test]
    fn validation_happens_before_io() {
        let storage = Arc::new(CountingStorage::default());
        let resizer = mock_resizer(
            storage.clone(),
            Arc::new(NoopCache),
            ResizerSettings::default(),
        );
        let options = TransformOptions {
            fill: true,
            ..sized("100x")
        };
        assert!(matches!(
            resizer.resolve("a.png", &options),
            Err(ResizeError::Validation(ValidationError::FillRequiresDimensions))
        ));
        assert_eq!(storage.calls(), 0);
    }

    #[test]
    fn resolve_walks_generated_then_cache_hit() {
        let storage = Arc::new(MemoryStorage::new());
        storage.save("a.png", b"source").unwrap();
        let resizer = mock_resizer(
            storage.clone(),
            Arc::new(MemoryCache::new()),
            ResizerSettings::default(),
        );

        let first = resizer.resolve_detailed("/a.png", &sized("100x50")).unwrap();
        assert_eq!(first.outcome, Outcome::Generated);
        assert!(first.url.starts_with("/resized-images/"));
        assert!(first.url.ends_with(".png"));

        let second = resizer.resolve_detailed("/a.png", &sized("100x50")).unwrap();
        assert_eq!(second, Resolved { outcome: Outcome::CacheHit, ..first });
    }

    #[test]
    fn resolve_storage_hit_with_noop_cache() {
        let storage = Arc::new(MemoryStorage::new());
        storage.save("a.png", b"source").unwrap();
        let resizer = mock_resizer(
            storage.clone(),
            Arc::new(NoopCache),
            ResizerSettings::default(),
        );

        let first = resizer.resolve_detailed("a.png", &sized("100x50")).unwrap();
        assert_eq!(first.outcome, Outcome::Generated);
        let second = resizer.resolve_detailed("a.png", &sized("100x50")).unwrap();
        assert_eq!(second.outcome, Outcome::StorageHit);
        assert_eq!(second.url, first.url);
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn contention_resolves_optimistically_by_default() {
        let storage = Arc::new(MemoryStorage::new());
        storage.save("a.png", b"source").unwrap();
        let cache = Arc::new(MemoryCache::new());
        let resizer = mock_resizer(storage.clone(), cache.clone(), ResizerSettings::default());

        let key = resizer
            .target("a.png", &sized("100x50"))
            .unwrap()
            .unique_key()
            .clone();
        cache
            .acquire_generation_lock(key.as_str(), DEFAULT_LOCK_TTL)
            .unwrap()
            .unwrap();

        let resolved = resizer.resolve_detailed("a.png", &sized("100x50")).unwrap();
        assert_eq!(resolved.outcome, Outcome::InProgress);
        assert_eq!(resolved.url, format!("/{key}"));
        assert!(!storage.exists(key.as_str()).unwrap());
    }

    #[test]
    fn contention_raises_when_configured() {
        let storage = Arc::new(MemoryStorage::new());
        storage.save("a.png", b"source").unwrap();
        let cache = Arc::new(MemoryCache::new());
        let resizer = mock_resizer(
            storage,
            cache.clone(),
            ResizerSettings {
                raise_on_generate_in_progress: true,
                ..ResizerSettings::default()
            },
        );
        let key = resizer
            .target("a.png", &sized("100x50"))
            .unwrap()
            .unique_key()
            .clone();
        cache
            .acquire_generation_lock(key.as_str(), DEFAULT_LOCK_TTL)
            .unwrap()
            .unwrap();

        assert!(matches!(
            resizer.resolve("a.png", &sized("100x50")),
            Err(ResizeError::GenerateInProgress(_))
        ));
    }

    #[test]
    fn resolve_missing_source_is_not_found() {
        let resizer = mock_resizer(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryCache::new()),
            ResizerSettings::default(),
        );
        assert!(matches!(
            resizer.resolve("nope.png", &sized("10")),
            Err(ResizeError::ImageNotFound(_))
        ));
    }
}
