//! Content encryption policy and the seal/open frame transforms.
//!
//! A frame's content is encrypted iff all three hold:
//!
//! 1. a session key is installed,
//! 2. `from_id` is not the relay sentinel,
//! 3. the frame is not the literal `DONE` status addressed to the relay.
//!
//! The same condition applies on receive. Encrypted content is
//! `base64(IV ‖ ciphertext‖tag)` over the raw engine payload; sealed and
//! opened frames both carry base64 strings, so sessions never see
//! ciphertext.

use quorix_crypto::aead::{self, SessionKey};
use quorix_crypto::encoding;
use quorix_types::ProtocolMessage;

use crate::Result;

/// Whether the encryption policy applies to this frame at all
/// (independent of whether a key is installed).
pub fn requires_cipher(message: &ProtocolMessage) -> bool {
    !message.is_from_server() && !message.is_done()
}

/// Prepare an outbound frame for the wire, encrypting content when the
/// policy applies.
pub fn seal(mut message: ProtocolMessage, key: Option<&SessionKey>) -> Result<ProtocolMessage> {
    if let Some(key) = key {
        if requires_cipher(&message) {
            let payload = encoding::b64_decode(&message.content)?;
            message.content = aead::encrypt_b64(key, &payload)?;
        }
    }
    Ok(message)
}

/// Recover an inbound frame's plaintext content when the policy applies.
pub fn open(mut message: ProtocolMessage, key: Option<&SessionKey>) -> Result<ProtocolMessage> {
    if let Some(key) = key {
        if requires_cipher(&message) {
            let payload = aead::decrypt_b64(key, &message.content)?;
            message.content = encoding::b64_encode(&payload);
        }
    }
    Ok(message)
}
