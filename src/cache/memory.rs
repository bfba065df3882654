use super::{Cache, CacheError, LockToken};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Held {
    expires: Instant,
    token: LockToken,
}

#[derive(Debug, Default)]
struct State {
    members: BTreeSet<String>,
    locks: HashMap<String, Held>,
}

/// In-process cache. The generation lock excludes other threads of the same
/// process only.
#[derive(Debug, Default)]
pub struct MemoryCache {
    state: Mutex<State>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Cache for MemoryCache {
    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.state().members.contains(key))
    }

    fn add(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.state().members.insert(key.to_string()))
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.state().members.remove(key))
    }

    fn clear(&self) -> Result<bool, CacheError> {
        let mut state = self.state();
        let had_any = !state.members.is_empty();
        state.members.clear();
        Ok(had_any)
    }

    fn all(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.state().members.iter().cloned().collect())
    }

    fn acquire_generation_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, CacheError> {
        let now = Instant::now();
        let mut state = self.state();
        if let Some(held) = state.locks.get(key)
            && held.expires > now
        {
            return Ok(None);
        }
        let token = LockToken::new();
        state.locks.insert(
            key.to_string(),
            Held {
                expires: now + ttl,
                token: token.clone(),
            },
        );
        Ok(Some(token))
    }

    fn release_generation_lock(&self, key: &str, token: &LockToken) -> Result<bool, CacheError> {
        let mut state = self.state();
        match state.locks.get(key) {
            Some(held) if held.token == *token => {
                state.locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
