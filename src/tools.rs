//! Maintenance operations over a [`Resizer`]'s backends.
//!
//! These back the `list`, `sync` and `clear` CLI commands. They only touch
//! the generated tree (`target_directory`) and the cache set; source images
//! are never listed or deleted.

use crate::resizing::{ResizeError, Resizer};
use std::collections::BTreeSet;
use std::fmt;

/// Generated images currently in storage.
pub fn list_images(resizer: &Resizer) -> Result<Vec<String>, ResizeError> {
    Ok(resizer
        .storage()
        .list_tree(&resizer.settings().target_directory)?)
}

/// Keys currently in the cache.
pub fn list_cache(resizer: &Resizer) -> Result<Vec<String>, ResizeError> {
    Ok(resizer.cache().all()?)
}

/// What [`sync_cache`] changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Cached keys with no blob in storage.
    pub removed: Vec<String>,
    /// Stored blobs that were missing from the cache.
    pub added: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for key in &self.removed {
            writeln!(f, "Removed {key}")?;
        }
        for key in &self.added {
            writeln!(f, "Added {key}")?;
        }
        Ok(())
    }
}

/// Make the cache agree with storage.
pub fn sync_cache(resizer: &Resizer) -> Result<SyncReport, ResizeError> {
    let cache = resizer.cache();
    let cached: BTreeSet<String> = cache.all()?.into_iter().collect();
    let stored: BTreeSet<String> = list_images(resizer)?.into_iter().collect();

    let mut report = SyncReport::default();
    for key in cached.difference(&stored) {
        cache.remove(key)?;
        report.removed.push(key.clone());
    }
    for key in stored.difference(&cached) {
        cache.add(key)?;
        report.added.push(key.clone());
    }
    tracing::info!(
        removed = report.removed.len(),
        added = report.added.len(),
        "cache synced"
    );
    Ok(report)
}

pub fn clear_cache(resizer: &Resizer) -> Result<bool, ResizeError> {
    Ok(resizer.cache().clear()?)
}

/// Delete every generated image, returning the deleted keys.
pub fn clear_images(resizer: &Resizer) -> Result<Vec<String>, ResizeError> {
    let deleted = resizer
        .storage()
        .delete_tree(&resizer.settings().target_directory)?;
    tracing::info!(count = deleted.len(), "deleted generated images");
    Ok(deleted)
}

/// [`clear_images`] then [`clear_cache`].
pub fn clear_all(resizer: &Resizer) -> Result<Vec<String>, ResizeError> {
    let deleted = clear_images(resizer)?;
    clear_cache(resizer)?;
    Ok(deleted)
}
