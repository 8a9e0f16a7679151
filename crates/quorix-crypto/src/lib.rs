//! # quorix-crypto
//!
//! Cryptographic utilities for the Quorix participant library.
//!
//! The cipher suite is fixed: no negotiation is permitted anywhere in the
//! protocol.
//!
//! ## Modules
//!
//! - [`aead`] — AES-256-GCM with a random 96-bit IV prefixed to the
//!   ciphertext, plus the base64 wire form and 32-byte key import
//! - [`kdf`] — PBKDF2-SHA256 key derivation for at-rest encryption
//! - [`encoding`] — base64/hex helpers with error mapping

pub mod aead;
pub mod encoding;
pub mod kdf;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Key material had the wrong length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    AeadEncryption,

    /// AEAD decryption failed (authentication tag mismatch or truncation).
    #[error("AEAD decryption failed")]
    AeadDecryption,

    /// Base64 or hex decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Key derivation input was invalid.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Convenience result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
