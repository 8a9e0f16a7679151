//! AES-256-GCM content encryption.
//!
//! Wire form: `IV ‖ ciphertext‖tag`, with the 96-bit IV drawn fresh from
//! the OS RNG for every message. IV reuse under one key is forbidden; the
//! only way to encrypt through this module is with a fresh IV.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding;
use crate::{CryptoError, Result};

/// Key size for AES-256-GCM (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// IV size (96 bits = 12 bytes).
pub const IV_SIZE: usize = 12;

/// Authentication tag size (128 bits = 16 bytes).
pub const TAG_SIZE: usize = 16;

/// A 256-bit session key, zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl From<[u8; KEY_SIZE]> for SessionKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Generate a fresh random session key.
pub fn generate_key() -> SessionKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    SessionKey(bytes)
}

/// Import key material: raw 32 bytes, or base64 decoding to 32 bytes.
///
/// Anything else fails with [`CryptoError::InvalidKeyLength`].
pub fn import_key(material: &[u8]) -> Result<SessionKey> {
    if material.len() == KEY_SIZE {
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(material);
        return Ok(SessionKey(bytes));
    }
    if let Ok(text) = std::str::from_utf8(material) {
        if let Ok(decoded) = encoding::b64_decode(text.trim()) {
            if decoded.len() == KEY_SIZE {
                let mut bytes = [0u8; KEY_SIZE];
                bytes.copy_from_slice(&decoded);
                return Ok(SessionKey(bytes));
            }
        }
    }
    Err(CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: material.len(),
    })
}

/// Encrypt, returning `IV ‖ ciphertext‖tag`.
pub fn encrypt(key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut iv = [0u8; IV_SIZE];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::AeadEncryption)?;

    let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `IV ‖ ciphertext‖tag` produced by [`encrypt`].
pub fn decrypt(key: &SessionKey, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < IV_SIZE + TAG_SIZE {
        return Err(CryptoError::AeadDecryption);
    }
    let (iv, ciphertext) = data.split_at(IV_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::AeadDecryption)
}

/// Encrypt to the base64 wire form carried in `ProtocolMessage.content`.
pub fn encrypt_b64(key: &SessionKey, plaintext: &[u8]) -> Result<String> {
    Ok(encoding::b64_encode(&encrypt(key, plaintext)?))
}

/// Decrypt the base64 wire form back to the plaintext payload.
pub fn decrypt_b64(key: &SessionKey, content: &str) -> Result<Vec<u8>> {
    decrypt(key, &encoding::b64_decode(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::from([0x42u8; KEY_SIZE])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let plaintext = b"round 2 payload";
        let sealed = encrypt(&key(), plaintext).expect("encrypt");
        let opened = decrypt(&key(), &sealed).expect("decrypt");
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_iv_is_fresh_per_message() {
        let a = encrypt(&key(), b"same").expect("encrypt");
        let b = encrypt(&key(), b"same").expect("encrypt");
        assert_ne!(a[..IV_SIZE], b[..IV_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_output_layout() {
        let sealed = encrypt(&key(), b"xyz").expect("encrypt");
        assert_eq!(sealed.len(), IV_SIZE + 3 + TAG_SIZE);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(&key(), b"secret").expect("encrypt");
        let other = SessionKey::from([0x43u8; KEY_SIZE]);
        assert!(decrypt(&other, &sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut sealed = encrypt(&key(), b"secret").expect("encrypt");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(decrypt(&key(), &sealed).is_err());
    }

    #[test]
    fn test_truncated_input_fails() {
        assert!(decrypt(&key(), &[0u8; IV_SIZE + TAG_SIZE - 1]).is_err());
    }

    #[test]
    fn test_b64_wire_roundtrip() {
        let content = encrypt_b64(&key(), b"engine payload").expect("encrypt");
        let opened = decrypt_b64(&key(), &content).expect("decrypt");
        assert_eq!(opened, b"engine payload");
    }

    #[test]
    fn test_import_raw_key() {
        let imported = import_key(&[0x07u8; KEY_SIZE]).expect("import");
        assert_eq!(imported.as_bytes(), &[0x07u8; KEY_SIZE]);
    }

    #[test]
    fn test_import_base64_key() {
        let encoded = crate::encoding::b64_encode(&[0x07u8; KEY_SIZE]);
        let imported = import_key(encoded.as_bytes()).expect("import");
        assert_eq!(imported.as_bytes(), &[0x07u8; KEY_SIZE]);
    }

    #[test]
    fn test_import_bad_length_rejected() {
        assert!(import_key(&[0u8; 31]).is_err());
        assert!(import_key(&[0u8; 33]).is_err());
        let short = crate::encoding::b64_encode(&[0u8; 16]);
        assert!(import_key(short.as_bytes()).is_err());
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(generate_key().as_bytes(), generate_key().as_bytes());
    }
}
