//! Resizer configuration module.
//!
//! Handles loading and validating `resize.toml` and turning it into a ready
//! [`Resizer`] with concrete storage and cache backends.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! url = "/"                           # Public base URL of generated images
//! noop = false                        # Return input URLs untouched
//! target_directory = "resized-images" # Storage prefix for generated images
//! hash_method = "sha1"                # sha1, sha224, sha256, sha384, sha512
//! raise_on_generate_in_progress = false
//! repair_cache_on_storage_hit = true
//!
//! [storage]
//! backend = "file"                    # file | memory | s3
//! root = "."                          # file backend: directory holding sources and output
//!
//! [storage.s3]
//! bucket = "images"                   # required by the s3 backend
//! region = "eu-west-1"                # omit to use AWS_REGION
//! endpoint = "http://localhost:9000"  # S3-compatible servers; omit for AWS
//! prefix = ""                         # key prefix inside the bucket
//!
//! [cache]
//! backend = "noop"                    # noop | memory | file | redis
//! lock_ttl_secs = 600                 # Generation lock TTL (crash recovery only)
//! dir = ".resize-cache"               # file backend: shared cache directory
//!
//! [cache.redis]
//! host = "localhost"
//! port = 6379
//! db = 0
//! key = "resize-cache"                # Name of the Redis set
//!
//! [processing]
//! max_processes = 4                   # CLI generate workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected, so a typo fails loudly instead of silently
//! falling back to a default.

use crate::cache::{Cache, CacheError, FileCache, MemoryCache, NoopCache};
use crate::imaging::RustBackend;
use crate::key::{DEFAULT_TARGET_DIRECTORY, HashMethod};
use crate::resizing::{Resizer, ResizerSettings};
use crate::storage::{FileStorage, MemoryStorage, Storage, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default config file name looked up by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "resize.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Cache setup failed: {0}")]
    Cache(#[from] CacheError),
    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),
}

/// Resizer configuration loaded from `resize.toml`.
///
/// All fields have sensible defaults. Config files need only specify the
/// values they want to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    pub url: String,
    pub noop: bool,
    pub target_directory: String,
    pub hash_method: HashMethod,
    pub raise_on_generate_in_progress: bool,
    pub repair_cache_on_storage_hit: bool,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub processing: ProcessingConfig,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            url: "/".to_string(),
            noop: false,
            target_directory: DEFAULT_TARGET_DIRECTORY.to_string(),
            hash_method: HashMethod::default(),
            raise_on_generate_in_progress: false,
            repair_cache_on_storage_hit: true,
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl ResizeConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Validation("url must not be empty".into()));
        }
        let target = Path::new(&self.target_directory);
        let relative = target
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if self.target_directory.is_empty() || !relative {
            return Err(ConfigError::Validation(
                "target_directory must be a non-empty relative path without `..`".into(),
            ));
        }
        if self.cache.lock_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "cache.lock_ttl_secs must be greater than 0".into(),
            ));
        }
        if self.cache.backend == CacheBackend::Redis && self.cache.redis.key.is_empty() {
            return Err(ConfigError::Validation(
                "cache.redis.key must not be empty".into(),
            ));
        }
        if self.storage.backend == StorageBackend::S3 && self.storage.s3.bucket.is_empty() {
            return Err(ConfigError::Validation(
                "storage.s3.bucket is required by the s3 backend".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn resizer_settings(&self) -> ResizerSettings {
        ResizerSettings {
            base_url: self.url.clone(),
            noop: self.noop,
            hash_method: self.hash_method,
            target_directory: self.target_directory.clone(),
            lock_ttl: Duration::from_secs(self.cache.lock_ttl_secs),
            raise_on_generate_in_progress: self.raise_on_generate_in_progress,
            repair_cache_on_storage_hit: self.repair_cache_on_storage_hit,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
    S3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory of the file backend. Source paths and generated keys
    /// are both relative to it.
    pub root: PathBuf,
    pub s3: S3Config,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            root: PathBuf::from("."),
            s3: S3Config::default(),
        }
    }
}

/// Bucket settings of the s3 backend. Credentials come from the `AWS_*`
/// environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    /// Endpoint of an S3-compatible server. `AWS_ENDPOINT_URL` is used when
    /// absent.
    pub endpoint: Option<String>,
    /// Key prefix inside the bucket.
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Noop,
    Memory,
    File,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// TTL of the generation lock, in seconds.
    pub lock_ttl_secs: u64,
    /// Directory of the file backend.
    pub dir: PathBuf,
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Noop,
            lock_ttl_secs: crate::cache::DEFAULT_LOCK_TTL.as_secs(),
            dir: PathBuf::from(".resize-cache"),
            redis: RedisConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    /// Name of the Redis set holding cached keys.
    pub key: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            key: "resize-cache".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel `generate` workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Parse and validate config from a TOML string.
pub fn parse_config(content: &str) -> Result<ResizeConfig, ConfigError> {
    let config: ResizeConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`.
///
/// A missing file yields the defaults. A file that exists but fails to parse
/// or validate is an error.
pub fn load_config(path: &Path) -> Result<ResizeConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(ResizeConfig::default());
    }
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

fn make_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, ConfigError> {
    match config.backend {
        StorageBackend::File => Ok(Arc::new(FileStorage::new(&config.root))),
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageBackend::S3 => make_s3_storage(&config.s3),
    }
}

#[cfg(feature = "s3")]
fn make_s3_storage(config: &S3Config) -> Result<Arc<dyn Storage>, ConfigError> {
    use crate::storage::S3Storage;
    Ok(Arc::new(S3Storage::new(
        &config.bucket,
        config.region.as_deref(),
        config.endpoint.as_deref(),
        &config.prefix,
    )?))
}

#[cfg(not(feature = "s3"))]
fn make_s3_storage(_config: &S3Config) -> Result<Arc<dyn Storage>, ConfigError> {
    Err(ConfigError::BackendUnavailable(
        "the s3 storage requires building with the `s3` feature".into(),
    ))
}

fn make_cache(config: &CacheConfig) -> Result<Arc<dyn Cache>, ConfigError> {
    match config.backend {
        CacheBackend::Noop => Ok(Arc::new(NoopCache)),
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackend::File => Ok(Arc::new(FileCache::new(&config.dir))),
        CacheBackend::Redis => make_redis_cache(&config.redis),
    }
}

#[cfg(feature = "redis")]
fn make_redis_cache(config: &RedisConfig) -> Result<Arc<dyn Cache>, ConfigError> {
    use crate::cache::RedisCache;
    let url = RedisCache::url(
        &config.host,
        config.port,
        config.db,
        config.password.as_deref(),
    );
    Ok(Arc::new(RedisCache::new(&url, config.key.clone())?))
}

#[cfg(not(feature = "redis"))]
fn make_redis_cache(_config: &RedisConfig) -> Result<Arc<dyn Cache>, ConfigError> {
    Err(ConfigError::BackendUnavailable(
        "the redis cache requires building with the `redis` feature".into(),
    ))
}

/// Build a [`Resizer`] with the backends `config` selects.
pub fn make_resizer(config: &ResizeConfig) -> Result<Resizer, ConfigError> {
    config.validate()?;
    let storage = make_storage(&config.storage)?;
    let cache = make_cache(&config.cache)?;
    Ok(Resizer::new(
        storage,
        cache,
        Arc::new(RustBackend::new()),
        config.resizer_settings(),
    ))
}

/// Returns a fully-commented stock `resize.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Resize Cache Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Public base URL that generated image paths are joined onto. Input URLs
# starting with it have it stripped before lookup.
url = "/"

# When true, resolve returns input URLs unchanged and does nothing else.
noop = false

# Storage prefix of generated images.
target_directory = "resized-images"

# Digest naming generated images: sha1, sha224, sha256, sha384, sha512.
# Changing it re-keys every image.
hash_method = "sha1"

# When another process is generating the same image: true returns an error,
# false returns the URL the image will have once it is written.
raise_on_generate_in_progress = false

# Add images found in storage but missing from the cache to the cache.
repair_cache_on_storage_hit = true

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# file:   a local directory
# memory: in-process, lost on exit
# s3:     an S3 bucket (needs the `s3` feature)
backend = "file"
# Root of the file backend. Source images and generated images both live here.
root = "."

# Bucket of the s3 backend. Credentials are read from AWS_ACCESS_KEY_ID,
# AWS_SECRET_ACCESS_KEY and the other AWS_* variables.
[storage.s3]
# bucket = "images"
# region = "eu-west-1"
# Endpoint of an S3-compatible server. Falls back to AWS_ENDPOINT_URL.
# endpoint = "http://localhost:9000"
# Key prefix inside the bucket.
prefix = ""

# ---------------------------------------------------------------------------
# Cache
# ---------------------------------------------------------------------------
[cache]
# noop:   no cache; concurrent generations of the same image are not prevented
# memory: in-process
# file:   marker and lock files under `dir`; shared by processes on one host
# redis:  shared by every process using the server (needs the `redis` feature)
backend = "noop"

# TTL of the generation lock. Only bounds how long a crashed generator can
# block an image; it does not limit legitimate generation time.
lock_ttl_secs = 600

# Directory of the file cache.
dir = ".resize-cache"

[cache.redis]
host = "localhost"
port = 6379
db = 0
# password = "secret"
# Name of the Redis set holding cached keys.
key = "resize-cache"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for `generate`. Omit to use all CPU cores.
# Values above the core count are clamped down.
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = ResizeConfig::default();
        assert_eq!(config.url, "/");
        assert_eq!(config.target_directory, "resized-images");
        assert_eq!(config.hash_method, HashMethod::Sha1);
        assert!(!config.raise_on_generate_in_progress);
        assert!(config.repair_cache_on_storage_hit);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.cache.backend, CacheBackend::Noop);
        assert_eq!(config.cache.lock_ttl_secs, 600);
        assert_eq!(config.processing.max_processes, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config = parse_config(stock_config_toml()).unwrap();
        assert_eq!(config, ResizeConfig::default());
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = parse_config(
            r#"
url = "https://cdn.example.com/"
hash_method = "sha256"

[cache]
backend = "file"
dir = "/tmp/rc"
"#,
        )
        .unwrap();
        assert_eq!(config.url, "https://cdn.example.com/");
        assert_eq!(config.hash_method, HashMethod::Sha256);
        assert_eq!(config.cache.backend, CacheBackend::File);
        assert_eq!(config.cache.dir, PathBuf::from("/tmp/rc"));
        assert_eq!(config.cache.lock_ttl_secs, 600);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            parse_config("colour = 'red'"),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            parse_config("[cache]\nttl = 5"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(matches!(
            parse_config("[storage]\nbackend = 'ftp'"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let cases = [
            "url = ''",
            "target_directory = ''",
            "target_directory = '../out'",
            "target_directory = '/abs'",
            "[cache]\nlock_ttl_secs = 0",
            "[processing]\nmax_processes = 0",
            "[cache]\nbackend = 'redis'\n[cache.redis]\nkey = ''",
            "[storage]\nbackend = 's3'",
        ];
        for case in cases {
            let err = parse_config(case).unwrap_err();
            assert!(
                matches!(err, ConfigError::Validation(_)),
                "expected validation error for {case:?}, got {err}"
            );
        }
    }

    #[test]
    fn settings_follow_config() {
        let config = parse_config(
            "url = '/media'\nnoop = true\nraise_on_generate_in_progress = true\n[cache]\nlock_ttl_secs = 30",
        )
        .unwrap();
        let settings = config.resizer_settings();
        assert_eq!(settings.base_url, "/media");
        assert!(settings.noop);
        assert!(settings.raise_on_generate_in_progress);
        assert_eq!(settings.lock_ttl, Duration::from_secs(30));
    }

    #[test]
    fn load_config_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("resize.toml")).unwrap();
        assert_eq!(config, ResizeConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("resize.toml");
        fs::write(&path, "target_directory = 'thumbs'\n").unwrap();
        assert_eq!(load_config(&path).unwrap().target_directory, "thumbs");
    }

    #[test]
    fn make_resizer_builds_configured_backends() {
        let tmp = TempDir::new().unwrap();
        let mut config = ResizeConfig::default();
        config.storage.root = tmp.path().to_path_buf();
        config.cache.backend = CacheBackend::File;
        config.cache.dir = tmp.path().join("cache");
        config.url = "/media".into();

        let resizer = make_resizer(&config).unwrap();
        assert_eq!(resizer.settings().base_url, "/media/");
        assert!(resizer.cache().is_cooperative());
    }

    #[cfg(not(feature = "redis"))]
    #[test]
    fn redis_without_feature_is_unavailable() {
        let mut config = ResizeConfig::default();
        config.cache.backend = CacheBackend::Redis;
        assert!(matches!(
            make_resizer(&config),
            Err(ConfigError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn s3_section_parses() {
        let config = parse_config(
            r#"
[storage]
backend = "s3"

[storage.s3]
bucket = "images"
endpoint = "http://localhost:9000"
prefix = "media"
"#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.s3.bucket, "images");
        assert_eq!(config.storage.s3.region, None);
        assert_eq!(
            config.storage.s3.endpoint.as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(config.storage.s3.prefix, "media");
    }

    #[cfg(not(feature = "s3"))]
    #[test]
    fn s3_without_feature_is_unavailable() {
        let mut config = ResizeConfig::default();
        config.storage.backend = StorageBackend::S3;
        config.storage.s3.bucket = "images".into();
        assert!(matches!(
            make_resizer(&config),
            Err(ConfigError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn effective_threads_clamps_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
        let config = ProcessingConfig {
            max_processes: Some(cores + 100),
        };
        assert_eq!(effective_threads(&config), cores);
    }
}
