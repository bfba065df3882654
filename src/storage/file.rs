use super::{Storage, StorageError, tree_prefix};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Prefix of in-flight writes. Never a visible key.
const TEMP_PREFIX: &str = ".tmp-";

/// Storage backed by a local directory.
///
/// Keys map to paths below `root`. Keys that would escape the root
/// (absolute paths, `..` components) are rejected.
///
/// A save is written to a temp file next to its target, synced, and then
/// published with a no-clobber rename, so readers see either nothing or the
/// whole blob.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Convert an on-disk path below the root back into a `/`-separated key.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        Some(parts.join("/"))
    }
}

fn not_found_or(err: io::Error, key: &str) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
        io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(key.to_string()),
        _ => StorageError::Io(err),
    }
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(TEMP_PREFIX))
}

impl Storage for FileStorage {
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        if key.is_empty() {
            return Ok(false);
        }
        Ok(self.full_path(key)?.is_file())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        if key.is_empty() {
            return Err(StorageError::NotFound(String::new()));
        }
        let path = self.full_path(key)?;
        fs::read(&path).map_err(|e| not_found_or(e, key))
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(String::new()));
        }
        let path = self.full_path(key)?;
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;
        if path.exists() {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&path)
            .map_err(|e| not_found_or(e.error, key))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.full_path(key)?;
        fs::remove_file(&path).map_err(|e| not_found_or(e, key))
    }

    fn list_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.full_path(tree_prefix(prefix))?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
            if entry.file_type().is_file()
                && !is_temp(entry.path())
                && let Some(key) = self.key_for(entry.path())
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn delete_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let keys = self.list_tree(prefix)?;
        for key in &keys {
            self.delete(key)?;
        }
        let dir = self.full_path(tree_prefix(prefix))?;
        if dir.is_dir() && dir != self.root {
            fs::remove_dir_all(&dir)?;
        }
        Ok(keys)
    }
}
