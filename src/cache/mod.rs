//! Fast existence cache and generation lock.
//!
//! The cache answers "has this unique key already been generated?" without
//! touching storage, and provides the only coordination primitive in the
//! whole system: a TTL-bounded, set-if-absent generation lock scoped to one
//! unique key.
//!
//! # Backends
//!
//! | Backend | Existence set | Lock cooperates across |
//! |---|---|---|
//! | [`NoopCache`] | always empty | nothing (every caller "wins") |
//! | [`MemoryCache`] | in-process | threads of one process |
//! | [`FileCache`] | marker files | processes sharing a directory |
//! | `RedisCache` (feature `redis`) | Redis set | processes sharing a server |
//!
//! With [`NoopCache`] two concurrent generations of the same key can race
//! and both try to write the same storage path. That configuration trades
//! mutual exclusion for having no cache at all.
//!
//! # Generation lock
//!
//! [`Cache::acquire_generation_lock`] never blocks: it returns `None` at
//! once when someone else holds the lock, and a [`LockToken`] otherwise.
//! Release only succeeds for the token that currently owns the lock, so a
//! holder whose TTL lapsed cannot free the lock of whoever reclaimed it. The TTL exists purely so that a
//! holder that dies mid-generation does not wedge the key forever. It is not
//! a timeout on legitimate work. [`GenerationLock`] wraps acquisition in a
//! guard that releases on drop, so every exit path of the critical section
//! gives the lock back.

mod file;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use file::FileCache;
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis::RedisCache;

use std::time::Duration;
use thiserror::Error;

/// Default TTL of the generation lock.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(600);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid cache key: `{0}`")]
    InvalidKey(String),
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Existence set plus mutual-exclusion primitive, keyed by unique key.
pub trait Cache: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Record `key` as generated. Returns whether it was newly added.
    fn add(&self, key: &str) -> Result<bool, CacheError>;

    /// Forget `key`. Returns whether it was present. Removing an absent key
    /// is not an error.
    fn remove(&self, key: &str) -> Result<bool, CacheError>;

    /// Forget every key. Returns whether anything was removed.
    fn clear(&self) -> Result<bool, CacheError>;

    fn all(&self) -> Result<Vec<String>, CacheError>;

    /// Try to become the exclusive generator of `key` for at most `ttl`.
    fn acquire_generation_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, CacheError>;

    /// Release the lock on `key` if `token` still owns it. Returns whether
    /// it did; `false` means the lock expired and was reclaimed, or was
    /// already gone.
    fn release_generation_lock(&self, key: &str, token: &LockToken) -> Result<bool, CacheError>;

    /// Whether the lock actually excludes other callers.
    fn is_cooperative(&self) -> bool {
        true
    }
}

/// Proof of owning a generation lock. Unique per acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for LockToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Held generation lock. Released when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct GenerationLock<'a> {
    cache: &'a dyn Cache,
    key: String,
    token: LockToken,
}

impl<'a> GenerationLock<'a> {
    /// Acquire the lock for `key`, or `None` if another caller holds it.
    pub fn acquire(
        cache: &'a dyn Cache,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<Self>, CacheError> {
        Ok(cache
            .acquire_generation_lock(key, ttl)?
            .map(|token| Self {
                cache,
                key: key.to_string(),
                token,
            }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }
}

impl Drop for GenerationLock<'_> {
    fn drop(&mut self) {
        match self.cache.release_generation_lock(&self.key, &self.token) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(key = %self.key, "generation lock expired before release");
            }
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to release generation lock");
            }
        }
    }
}

/// Cache that remembers nothing and excludes nobody.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl Cache for NoopCache {
    fn exists(&self, _key: &str) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn add(&self, _key: &str) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn remove(&self, _key: &str) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn clear(&self) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn all(&self) -> Result<Vec<String>, CacheError> {
        Ok(Vec::new())
    }

    fn acquire_generation_lock(
        &self,
        _key: &str,
        _ttl: Duration,
    ) -> Result<Option<LockToken>, CacheError> {
        Ok(Some(LockToken::new()))
    }

    fn release_generation_lock(&self, _key: &str, _token: &LockToken) -> Result<bool, CacheError> {
        Ok(true)
    }

    fn is_cooperative(&self) -> bool {
        false
    }
}

/// Reject keys that are empty or would escape a directory when used as a
/// relative path.
pub(crate) fn check_key(key: &str) -> Result<(), CacheError> {
    use std::path::{Component, Path};
    let safe = !key.is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}
