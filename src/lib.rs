//! # Resize Cache
//!
//! Deterministic, idempotent image derivatives. A caller asks for "this source
//! image, at this size, in this format" and gets back a URL. The first request
//! renders and stores the derivative; every later request is a lookup.
//!
//! # Architecture: Key, Lookup, Generate
//!
//! ```text
//! 1. Validate   url + options  →  TransformRequest   (no I/O)
//! 2. Key        request        →  UniqueKey          (pure digest)
//! 3. Lookup     cache, then storage
//! 4. Generate   lock → load → decode → transform → encode → save → cache.add
//! ```
//!
//! Each step only depends on the one before it, so a bad request fails before
//! any backend is touched and a key can be computed without any backend at
//! all.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`params`] | Parsed parameter types: dimensions, colors, formats, quality |
//! | [`request`] | [`TransformOptions`] and the validated [`TransformRequest`] |
//! | [`key`] | Canonical serialization and digest of a request into a [`UniqueKey`] |
//! | [`storage`] | Durable blob store trait plus file, memory and S3 backends |
//! | [`cache`] | Key set plus generation lock trait, with noop, memory, file and Redis backends |
//! | [`imaging`] | Decode, resize, pad, flatten and encode behind the [`ImageBackend`] trait |
//! | [`resizing`] | [`ResizeTarget`] state machine and the [`Resizer`] façade |
//! | [`config`] | `resize.toml` loading, validation, and backend construction |
//! | [`tools`] | List, sync and clear operations used by the CLI |
//!
//! # Design Decisions
//!
//! ## Keys Are Content Addresses of the Request
//!
//! The key is a digest of the source path and every option that changes the
//! output bytes. It doubles as the storage path, the cache member, and the
//! lock name, so there is never a separate index to keep consistent. The
//! serialization order is fixed; see [`key`].
//!
//! ## Storage Is the Source of Truth
//!
//! The cache is an accelerator. A cache miss falls through to storage, and a
//! storage hit repairs the cache. A lost or cleared cache costs lookups, never
//! correctness.
//!
//! ## Locks Bound Crash Recovery, Not Work
//!
//! A generation lock carries a TTL only so that a crashed generator cannot
//! block a key forever. It is released by a guard on every exit path, so a
//! slow-but-healthy generation never loses it early to a timeout of ours.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding and resampling use the `image` crate (Lanczos3), JPEG output goes
//! through `jpeg-encoder` for progressive scans and ICC embedding, and SVG is
//! rasterized by `resvg`. There are no system library dependencies.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod key;
pub mod params;
pub mod request;
pub mod resizing;
pub mod storage;
pub mod tools;

pub use cache::{
    Cache, CacheError, FileCache, GenerationLock, LockToken, MemoryCache, NoopCache,
};
#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use imaging::{ImageBackend, RustBackend};
pub use key::{HashMethod, UniqueKey, derive_unique_key};
pub use request::{TransformOptions, TransformRequest};
pub use resizing::{
    CacheLookup, Outcome, ResizeError, ResizeTarget, Resizer, ResizerSettings, Resolved,
    StorageLookup,
};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
#[cfg(feature = "s3")]
pub use storage::S3Storage;

#[cfg(test)]
pub(crate) mod test_helpers;
