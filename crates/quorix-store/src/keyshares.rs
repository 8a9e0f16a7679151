//! The keyshare record store.
//!
//! Records are JSON blobs keyed by `keyshare_<group_id>_<party_index>`.
//! Rotation keeps exactly two generations per `(group, index)`: the
//! current record and one previous generation under the `_prev` suffix;
//! saving a third drops the oldest.
//!
//! Quota exhaustion is handled with a fixed retry ladder: evict session
//! scratch entries and retry, then purge the whole scope and retry, then
//! give up with [`StoreError::Full`].

use std::sync::Arc;

use quorix_types::{GroupId, KeyShare};

use crate::{BlobStore, Result, StoreError};

/// Prefix of every keyshare record key.
pub const KEYSHARE_PREFIX: &str = "keyshare_";

/// Suffix of the previous-generation record key.
pub const PREV_SUFFIX: &str = "_prev";

/// Prefix of transient per-session scratch entries, evicted first when
/// the backend runs out of space.
pub const SCRATCH_PREFIX: &str = "session_scratch_";

/// Store for keyshare records over any [`BlobStore`].
#[derive(Clone)]
pub struct KeyShareStore {
    store: Arc<dyn BlobStore>,
}

impl KeyShareStore {
    /// Wrap a blob store.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// The record key for a `(group, index)` pair.
    pub fn share_key(group_id: &GroupId, party_index: u8) -> String {
        format!("{KEYSHARE_PREFIX}{group_id}_{party_index}")
    }

    /// Persist a freshly generated record (non-rotation path).
    pub fn save(&self, record: &KeyShare) -> Result<()> {
        self.ensure_available()?;
        let key = Self::share_key(&record.group_id, record.party_index);
        let bytes = encode(record)?;
        self.save_with_retry(&key, &bytes)?;
        tracing::info!(
            group_id = %record.group_id,
            party_index = record.party_index,
            "keyshare persisted"
        );
        Ok(())
    }

    /// Persist a rotated record, demoting the current generation to the
    /// backup slot and dropping the older backup.
    pub fn save_rotated(&self, record: &KeyShare) -> Result<()> {
        self.ensure_available()?;
        let key = Self::share_key(&record.group_id, record.party_index);
        let prev_key = format!("{key}{PREV_SUFFIX}");

        if let Some(current) = self.store.get(&key)? {
            // Overwrites any older backup: exactly two generations live.
            self.save_with_retry(&prev_key, &current)?;
        }

        let bytes = encode(record)?;
        self.save_with_retry(&key, &bytes)?;
        tracing::info!(
            group_id = %record.group_id,
            party_index = record.party_index,
            "rotated keyshare persisted, previous generation kept"
        );
        Ok(())
    }

    /// Load the current record for a `(group, index)` pair.
    pub fn load(&self, group_id: &GroupId, party_index: u8) -> Result<Option<KeyShare>> {
        self.ensure_available()?;
        let key = Self::share_key(group_id, party_index);
        match self.store.get(&key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load the previous generation, when rotation has kept one.
    pub fn load_backup(&self, group_id: &GroupId, party_index: u8) -> Result<Option<KeyShare>> {
        self.ensure_available()?;
        let key = format!("{}{PREV_SUFFIX}", Self::share_key(group_id, party_index));
        match self.store.get(&key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove a record and its backup generation.
    pub fn delete(&self, group_id: &GroupId, party_index: u8) -> Result<()> {
        let key = Self::share_key(group_id, party_index);
        self.store.remove(&format!("{key}{PREV_SUFFIX}"))?;
        self.store.remove(&key)
    }

    /// All current-generation records, for rehydration after a restart.
    pub fn list(&self) -> Result<Vec<KeyShare>> {
        self.ensure_available()?;
        let mut records = Vec::new();
        for key in self.store.keys()? {
            if !key.starts_with(KEYSHARE_PREFIX) || key.ends_with(PREV_SUFFIX) {
                continue;
            }
            if let Some(bytes) = self.store.get(&key)? {
                records.push(decode(&bytes)?);
            }
        }
        records.sort_by(|a, b| {
            (a.group_id.as_str(), a.party_index).cmp(&(b.group_id.as_str(), b.party_index))
        });
        Ok(records)
    }

    /// Write a transient scratch entry (first in line for eviction).
    pub fn save_scratch(&self, name: &str, value: &[u8]) -> Result<()> {
        self.save_with_retry(&format!("{SCRATCH_PREFIX}{name}"), value)
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.store.available() {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }

    fn save_with_retry(&self, key: &str, value: &[u8]) -> Result<()> {
        match self.store.save(key, value) {
            Err(StoreError::Full) => {}
            other => return other,
        }

        // First retry: evict session scratch entries.
        self.evict_scratch()?;
        match self.store.save(key, value) {
            Err(StoreError::Full) => {}
            other => return other,
        }

        // Second retry: purge the whole scope.
        tracing::warn!(key, "storage still full after scratch eviction, purging scope");
        self.store.clear()?;
        self.store.save(key, value)
    }

    fn evict_scratch(&self) -> Result<()> {
        let mut evicted = 0usize;
        for key in self.store.keys()? {
            if key.starts_with(SCRATCH_PREFIX) {
                self.store.remove(&key)?;
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::debug!(evicted, "evicted session scratch entries");
        }
        Ok(())
    }
}

fn encode(record: &KeyShare) -> Result<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<KeyShare> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}
