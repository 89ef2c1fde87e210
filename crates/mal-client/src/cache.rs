//! In-memory cache for fetched auxiliary resources (cover images).
//!
//! Entries live for the life of the process. There is no eviction and no
//! invalidation; a failed fetch stores nothing.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Cached payload, shared with every caller that asks for it
pub type Payload = Arc<[u8]>;

/// Key to payload map filled on first fetch
///
/// The lock is not held while fetching. Two callers racing on the same
/// missing key both fetch; the later store wins and both values are equal.
#[derive(Debug)]
pub struct ResponseCache<K> {
    entries: Mutex<HashMap<K, Payload>>,
}

impl<K> Default for ResponseCache<K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone + Debug> ResponseCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached payload for `key`, calling `fetch` on a miss
    pub fn get_or_fetch<F, E>(&self, key: &K, fetch: F) -> Result<Payload, E>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
    {
        if let Some(payload) = self.get(key) {
            debug!(key = ?key, "Cache hit");
            return Ok(payload);
        }

        debug!(key = ?key, "Cache miss");
        let payload: Payload = fetch()?.into();

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Arc::clone(&payload));
        debug!(key = ?key, bytes = payload.len(), "Cache stored");

        Ok(payload)
    }

    pub fn get(&self, key: &K) -> Option<Payload> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            total_entries: entries.len(),
            total_size_bytes: entries.values().map(|p| p.len() as u64).sum(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
}
