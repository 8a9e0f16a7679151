//! The abstract blob store and the in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{Result, StoreError};

/// A key-value blob store. Values are application-opaque.
///
/// Implementations must be safe under repeated saves with the same key:
/// last write wins.
pub trait BlobStore: Send + Sync {
    /// Store a value, replacing any previous one under the key.
    fn save(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Fetch a value.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove a value; removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently present.
    fn keys(&self) -> Result<Vec<String>>;

    /// Remove everything in this store's scope.
    fn clear(&self) -> Result<()>;

    /// Whether the backend is usable at all.
    fn available(&self) -> bool;
}

/// In-memory blob store with an optional entry quota.
///
/// The quota exists so the full/evict/purge paths of the keyshare store
/// are exercisable without a real constrained backend.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// An unbounded in-memory store.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: None,
        }
    }

    /// A store that rejects saves of new keys beyond `quota` entries.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MemoryStore {
    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.lock();
        if let Some(quota) = self.quota {
            if !entries.contains_key(key) && entries.len() >= quota {
                return Err(StoreError::Full);
            }
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }

    fn available(&self) -> bool {
        true
    }
}
