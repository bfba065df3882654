use super::{Storage, StorageError, tree_prefix};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-process storage. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs().is_empty()
    }
}

fn under(prefix: &str, key: &str) -> bool {
    let prefix = tree_prefix(prefix);
    prefix.is_empty()
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl Storage for MemoryStorage {
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(!key.is_empty() && self.blobs().contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(String::new()));
        }
        let mut blobs = self.blobs();
        if blobs.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        blobs.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blobs()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn list_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .blobs()
            .keys()
            .filter(|k| under(prefix, k))
            .cloned()
            .collect())
    }

    fn delete_tree(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut blobs = self.blobs();
        let keys: Vec<String> = blobs.keys().filter(|k| under(prefix, k)).cloned().collect();
        for key in &keys {
            blobs.remove(key);
        }
        Ok(keys)
    }
}
