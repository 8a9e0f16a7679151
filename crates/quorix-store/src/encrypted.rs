//! At-rest encryption wrapper for any blob store.
//!
//! Values are AES-256-GCM encrypted with a key derived from a
//! caller-supplied password and salt via PBKDF2-SHA256; each value gets
//! its own random IV. Keys (the string kind) stay in the clear so that
//! prefix scans keep working.

use std::sync::Arc;

use quorix_crypto::aead::{self, SessionKey};
use quorix_crypto::kdf;

use crate::{BlobStore, Result};

/// A blob store whose values are encrypted at rest.
pub struct EncryptedStore {
    inner: Arc<dyn BlobStore>,
    key: SessionKey,
}

impl EncryptedStore {
    /// Wrap a store, deriving the at-rest key from `password` and `salt`.
    pub fn new(inner: Arc<dyn BlobStore>, password: &[u8], salt: &[u8]) -> Result<Self> {
        let key = kdf::derive_key(password, salt, kdf::MIN_ITERATIONS)?;
        Ok(Self { inner, key })
    }
}

impl BlobStore for EncryptedStore {
    fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let sealed = aead::encrypt(&self.key, value)?;
        self.inner.save(key, &sealed)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.inner.get(key)? {
            Some(sealed) => Ok(Some(aead::decrypt(&self.key, &sealed)?)),
            None => Ok(None),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn available(&self) -> bool {
        self.inner.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn store() -> (Arc<MemoryStore>, EncryptedStore) {
        let inner = Arc::new(MemoryStore::new());
        let encrypted =
            EncryptedStore::new(inner.clone(), b"hunter2 but longer", b"per-app-salt")
                .expect("derive");
        (inner, encrypted)
    }

    #[test]
    fn test_roundtrip_through_encryption() {
        let (_inner, encrypted) = store();
        encrypted.save("k", b"cleartext record").expect("save");
        assert_eq!(
            encrypted.get("k").expect("get"),
            Some(b"cleartext record".to_vec())
        );
    }

    #[test]
    fn test_inner_store_sees_only_ciphertext() {
        let (inner, encrypted) = store();
        encrypted.save("k", b"cleartext record").expect("save");
        let raw = inner.get("k").expect("get").expect("present");
        assert_ne!(raw, b"cleartext record".to_vec());
        // IV + tag overhead on top of the plaintext.
        assert!(raw.len() > b"cleartext record".len());
    }

    #[test]
    fn test_values_get_fresh_ivs() {
        let (inner, encrypted) = store();
        encrypted.save("a", b"same").expect("save");
        encrypted.save("b", b"same").expect("save");
        let raw_a = inner.get("a").expect("get").expect("present");
        let raw_b = inner.get("b").expect("get").expect("present");
        assert_ne!(raw_a, raw_b);
    }

    #[test]
    fn test_wrong_password_fails_closed() {
        let inner = Arc::new(MemoryStore::new());
        let first = EncryptedStore::new(inner.clone(), b"password one", b"salt").expect("derive");
        first.save("k", b"secret").expect("save");

        let second = EncryptedStore::new(inner, b"password two", b"salt").expect("derive");
        assert!(second.get("k").is_err());
    }
}
