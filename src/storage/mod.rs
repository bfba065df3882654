//! Durable blob storage keyed by path-like strings.
//!
//! The [`Storage`] trait is the only thing the resize engine knows about
//! where images live. Source images are read through it and generated
//! derivatives are written back through it under their unique key.
//!
//! | Backend | Use |
//! |---|---|
//! | [`FileStorage`] | local directory tree, the production default |
//! | [`MemoryStorage`] | in-process map, for tests and ephemeral setups |
//! | `S3Storage` | S3 bucket or S3-compatible server (`s3` feature) |
//!
//! ## Contract
//!
//! - `get` fails with [`StorageError::NotFound`] for absent or empty keys.
//! - `save` never overwrites: an existing key is
//!   [`StorageError::AlreadyExists`].
//! - `delete` of an absent key is [`StorageError::NotFound`].
//! - `list_tree` / `delete_tree` return keys relative to the storage root,
//!   `/`-separated, sorted.

mod file;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use file::FileStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "s3")]
pub use s3::S3Storage;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: `{0}`")]
    NotFound(String),
    #[error("Already exists: `{0}`")]
    AlreadyExists(String),
    #[error("Invalid storage key: `{0}`")]
    InvalidKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "s3")]
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// Blob store interface consumed by the resize engine.
pub trait Storage: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool, StorageError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Store `data` under `key`. Fails if the key is already present.
    fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// All keys under `prefix`.
    fn list_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Delete everything under `prefix`, returning the deleted keys.
    fn delete_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Normalize a tree prefix: no trailing separator.
pub(crate) fn tree_prefix(prefix: &str) -> &str {
    prefix.trim_end_matches('/')
}
