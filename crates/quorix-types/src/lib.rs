//! # quorix-types
//!
//! Shared data model for the Quorix MPC participant library.
//!
//! This crate defines the identifiers, relay records, and wire frames
//! that every other crate in the workspace speaks:
//!
//! - [`ids`] — party/group identifiers and the server/broadcast sentinels
//! - [`group`] — group records returned by the relay (`GroupInfo`, members)
//! - [`message`] — the `ProtocolMessage` wire frame and round constants
//! - [`keyshare`] — the persisted `KeyShare` record
//!
//! All wire-facing structs use snake_case field names matching the relay
//! surface; binary fields are carried as base64 strings in JSON via the
//! [`base64_bytes`] serde helper.

pub mod group;
pub mod ids;
pub mod keyshare;
pub mod message;

pub use group::{GroupInfo, GroupMember, Party};
pub use ids::{GroupId, PartyId, BROADCAST_ID, SERVER_ID};
pub use keyshare::KeyShare;
pub use message::ProtocolMessage;

use serde::{Deserialize, Serialize};

/// Error types for data-model validation.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// A party identifier failed validation.
    #[error("invalid party id: {0}")]
    InvalidPartyId(String),

    /// A group identifier failed validation.
    #[error("invalid group id: {0}")]
    InvalidGroupId(String),

    /// A group record violated its invariants.
    #[error("invalid group: {0}")]
    InvalidGroup(String),

    /// A keyshare record violated its invariants.
    #[error("invalid keyshare record: {0}")]
    InvalidKeyShare(String),
}

/// Convenience result type for data-model validation.
pub type Result<T> = std::result::Result<T, TypesError>;

/// The protocol tag a session runs under on the relay socket.
///
/// Rotation is a fresh keygen bound to a prior keyshare and runs under
/// the `keygen` tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Distributed key generation (also used for rotation).
    Keygen,
    /// Distributed signature generation.
    Sign,
}

impl SessionKind {
    /// The path segment used in the relay socket URL.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Keygen => "keygen",
            SessionKind::Sign => "sign",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current unix time in milliseconds.
///
/// Wire timestamps and token freshness checks both use this clock.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Serde helper: `Vec<u8>` as a standard-alphabet base64 string.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
