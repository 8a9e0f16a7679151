//! PBKDF2-SHA256 key derivation for at-rest blob encryption.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::aead::{SessionKey, KEY_SIZE};
use crate::{CryptoError, Result};

/// Minimum accepted PBKDF2 iteration count.
pub const MIN_ITERATIONS: u32 = 100_000;

/// Derive a 256-bit key from a password and salt.
///
/// Iteration counts below [`MIN_ITERATIONS`] are rejected, as are empty
/// passwords and salts.
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> Result<SessionKey> {
    if password.is_empty() {
        return Err(CryptoError::KeyDerivation("empty password".to_string()));
    }
    if salt.is_empty() {
        return Err(CryptoError::KeyDerivation("empty salt".to_string()));
    }
    if iterations < MIN_ITERATIONS {
        return Err(CryptoError::KeyDerivation(format!(
            "iteration count {iterations} below minimum {MIN_ITERATIONS}"
        )));
    }

    let mut out = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    Ok(SessionKey::from(out))
}
