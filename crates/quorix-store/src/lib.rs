//! # quorix-store
//!
//! Keyshare persistence over an abstract blob store.
//!
//! The participant core never touches a concrete storage backend; it
//! works against the [`BlobStore`] trait. Platform layers supply an
//! implementation (browser storage, keychain, disk); this crate ships an
//! in-memory store for tests plus an encrypting wrapper for at-rest
//! protection.
//!
//! ## Modules
//!
//! - [`blob`] — the `BlobStore` trait and the in-memory implementation
//! - [`encrypted`] — at-rest encryption wrapper (PBKDF2 + AES-GCM)
//! - [`keyshares`] — the keyshare record store with the two-generation
//!   rotation backup policy and the quota retry ladder

pub mod blob;
pub mod encrypted;
pub mod keyshares;

pub use blob::{BlobStore, MemoryStore};
pub use encrypted::EncryptedStore;
pub use keyshares::KeyShareStore;

/// Error types for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend is out of space, even after eviction and purge.
    #[error("storage quota exhausted")]
    Full,

    /// The backend is not usable at all.
    #[error("storage unavailable")]
    Unavailable,

    /// At-rest encryption or decryption failed.
    #[error("storage crypto error: {0}")]
    Crypto(#[from] quorix_crypto::CryptoError),

    /// A stored record could not be decoded.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// Backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Convenience result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
