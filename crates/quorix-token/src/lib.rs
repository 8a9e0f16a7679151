//! # quorix-token
//!
//! Out-of-band session bootstrap tokens.
//!
//! The session initiator builds a short-lived JSON token carrying a fresh
//! 256-bit AES key and the session parameters, and hands it to the other
//! participants out of band (typically rendered as a QR, which is outside
//! this crate). A participant parses the token, checks its freshness,
//! installs the key into its transport, joins the group, and verifies the
//! relay's group parameters against the token.
//!
//! ## Freshness windows
//!
//! - [`BOOTSTRAP_WINDOW_MS`] (2 minutes) when the token is used to start
//!   a session — checked before any relay call.
//! - [`PARSE_WINDOW_MS`] (24 hours) when a token is merely inspected.

use serde::{Deserialize, Serialize};

use quorix_crypto::aead::{self, SessionKey};
use quorix_types::{GroupId, GroupInfo};

/// Freshness window for bootstrapping a session from a token.
pub const BOOTSTRAP_WINDOW_MS: u64 = 2 * 60 * 1000;

/// Freshness window for merely parsing a token.
pub const PARSE_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// Current token format version.
pub const TOKEN_VERSION: u32 = 1;

/// Error types for token handling.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token JSON was missing or malformed.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The embedded AES key did not decode to 32 bytes.
    #[error("token key is not 32 bytes")]
    BadKey,

    /// The token is older than its allowed window.
    #[error("token expired: age {age_ms} ms exceeds window {window_ms} ms")]
    Expired {
        /// Age of the token in milliseconds.
        age_ms: u64,
        /// The window it was checked against.
        window_ms: u64,
    },

    /// The relay's group parameters disagree with the token's.
    #[error("group mismatch: token says {token_n}/{token_t}, relay says {group_n}/{group_t}")]
    GroupMismatch {
        /// Total parties per the token.
        token_n: u16,
        /// Threshold per the token.
        token_t: u16,
        /// Total parties per the relay.
        group_n: u16,
        /// Threshold per the relay.
        group_t: u16,
    },

    /// Serialization failed.
    #[error("token serialization error: {0}")]
    Serialization(String),
}

/// Convenience result type for token handling.
pub type Result<T> = std::result::Result<T, TokenError>;

/// The protocol a token bootstraps.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Distributed key generation.
    Keygen,
    /// Distributed signing.
    Sign,
    /// Key rotation.
    Rotation,
}

/// An out-of-band session bootstrap token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// The protocol this token bootstraps.
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Session AES key, base64 (32 bytes).
    pub aes_key: String,
    /// The group the session runs in.
    pub group_id: GroupId,
    /// Signing threshold.
    pub threshold: u16,
    /// Total number of parties.
    pub total_parties: u16,
    /// Optional session timeout in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Creation time, unix milliseconds.
    pub timestamp: u64,
    /// Token format version.
    pub version: u32,
    /// Hash to sign, hex (sign tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_hash: Option<String>,
    /// Rotation flavor (rotation tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_type: Option<String>,
}

impl SessionToken {
    /// Build a keygen token with a fresh session key.
    pub fn keygen(group: &GroupInfo, now_ms: u64) -> (Self, SessionKey) {
        Self::build(TokenKind::Keygen, group, now_ms, None, None)
    }

    /// Build a signing token for a 32-byte message hash.
    pub fn sign(group: &GroupInfo, message_hash: &[u8; 32], now_ms: u64) -> (Self, SessionKey) {
        Self::build(
            TokenKind::Sign,
            group,
            now_ms,
            Some(hex::encode(message_hash)),
            None,
        )
    }

    /// Build a rotation token.
    pub fn rotation(group: &GroupInfo, rotation_type: &str, now_ms: u64) -> (Self, SessionKey) {
        Self::build(
            TokenKind::Rotation,
            group,
            now_ms,
            None,
            Some(rotation_type.to_string()),
        )
    }

    fn build(
        kind: TokenKind,
        group: &GroupInfo,
        now_ms: u64,
        message_hash: Option<String>,
        rotation_type: Option<String>,
    ) -> (Self, SessionKey) {
        let key = aead::generate_key();
        let token = Self {
            kind,
            aes_key: quorix_crypto::encoding::b64_encode(key.as_bytes()),
            group_id: group.group_id.clone(),
            threshold: group.t,
            total_parties: group.n,
            timeout: (group.timeout > 0).then_some(group.timeout),
            timestamp: now_ms,
            version: TOKEN_VERSION,
            message_hash,
            rotation_type,
        };
        (token, key)
    }

    /// Serialize the token to its JSON string form.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| TokenError::Serialization(e.to_string()))
    }

    /// Parse and validate a token against a freshness window.
    ///
    /// The expiry check runs before anything else can act on the token,
    /// so an expired token never reaches the relay.
    pub fn parse(encoded: &str, now_ms: u64, window_ms: u64) -> Result<Self> {
        let token: Self =
            serde_json::from_str(encoded).map_err(|e| TokenError::Malformed(e.to_string()))?;

        let age_ms = now_ms.saturating_sub(token.timestamp);
        if age_ms > window_ms {
            return Err(TokenError::Expired { age_ms, window_ms });
        }

        // Key must decode to exactly 32 bytes.
        token.session_key()?;

        match token.kind {
            TokenKind::Sign => {
                let hash = token
                    .message_hash
                    .as_deref()
                    .ok_or_else(|| TokenError::Malformed("sign token without message_hash".to_string()))?;
                let bytes =
                    hex::decode(hash).map_err(|e| TokenError::Malformed(format!("message_hash: {e}")))?;
                if bytes.len() != 32 {
                    return Err(TokenError::Malformed(format!(
                        "message_hash is {} bytes, expected 32",
                        bytes.len()
                    )));
                }
            }
            TokenKind::Rotation => {
                if token.rotation_type.is_none() {
                    return Err(TokenError::Malformed(
                        "rotation token without rotation_type".to_string(),
                    ));
                }
            }
            TokenKind::Keygen => {}
        }

        Ok(token)
    }

    /// Decode the embedded session key.
    pub fn session_key(&self) -> Result<SessionKey> {
        aead::import_key(self.aes_key.as_bytes()).map_err(|_| TokenError::BadKey)
    }

    /// The signing hash as raw bytes, when present.
    pub fn message_hash_bytes(&self) -> Result<Option<[u8; 32]>> {
        let Some(hash) = self.message_hash.as_deref() else {
            return Ok(None);
        };
        let bytes = hex::decode(hash).map_err(|e| TokenError::Malformed(format!("message_hash: {e}")))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TokenError::Malformed("message_hash is not 32 bytes".to_string()))?;
        Ok(Some(array))
    }

    /// Check the relay's group parameters against the token's.
    pub fn verify_group(&self, group: &GroupInfo) -> Result<()> {
        if group.n != self.total_parties || group.t != self.threshold {
            return Err(TokenError::GroupMismatch {
                token_n: self.total_parties,
                token_t: self.threshold,
                group_n: group.n,
                group_t: group.t,
            });
        }
        Ok(())
    }
}
