//! Party and group identifiers.
//!
//! A party presents itself to the relay with a compressed-public-key-shaped
//! hex handle; groups are addressed by a 64-hex-character id. Two sentinel
//! values appear on the wire: the relay's own sender id ([`SERVER_ID`]) and
//! the broadcast recipient ([`BROADCAST_ID`]).

use serde::{Deserialize, Serialize};

use crate::{Result, TypesError};

/// Sentinel `from_id` used by the relay for control frames (68 hex zeros).
///
/// Frames from this id are never content-encrypted.
pub const SERVER_ID: &str =
    "00000000000000000000000000000000000000000000000000000000000000000000";

/// Sentinel `to_id` for broadcast frames consumed by every peer.
pub const BROADCAST_ID: &str = "0";

/// Length of a regular party id in hex characters.
pub const PARTY_ID_LEN: usize = 66;

/// Length of a group id in hex characters.
pub const GROUP_ID_LEN: usize = 64;

/// A party identifier: 66 hex characters with an `02` or `03` prefix.
///
/// The wire also carries the sentinels [`SERVER_ID`] and [`BROADCAST_ID`]
/// in party-id positions, so construction is unvalidated; call
/// [`PartyId::validate`] where a regular peer id is required.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    /// Wrap a raw identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The relay's control-frame sender id.
    pub fn server() -> Self {
        Self(SERVER_ID.to_string())
    }

    /// The broadcast recipient sentinel.
    pub fn broadcast() -> Self {
        Self(BROADCAST_ID.to_string())
    }

    /// Whether this id is the relay sentinel.
    pub fn is_server(&self) -> bool {
        self.0 == SERVER_ID
    }

    /// Whether this id is the broadcast sentinel.
    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST_ID
    }

    /// Check that this is a well-formed regular peer id.
    pub fn validate(&self) -> Result<()> {
        if self.0.len() != PARTY_ID_LEN {
            return Err(TypesError::InvalidPartyId(format!(
                "expected {PARTY_ID_LEN} hex chars, got {}",
                self.0.len()
            )));
        }
        if !self.0.starts_with("02") && !self.0.starts_with("03") {
            return Err(TypesError::InvalidPartyId(
                "missing 02/03 prefix".to_string(),
            ));
        }
        if !self.0.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypesError::InvalidPartyId("non-hex character".to_string()));
        }
        Ok(())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A group identifier: 64 hex characters, unique per relay.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Wrap a raw identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Check that this is a well-formed group id.
    pub fn validate(&self) -> Result<()> {
        if self.0.len() != GROUP_ID_LEN {
            return Err(TypesError::InvalidGroupId(format!(
                "expected {GROUP_ID_LEN} hex chars, got {}",
                self.0.len()
            )));
        }
        if !self.0.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypesError::InvalidGroupId("non-hex character".to_string()));
        }
        Ok(())
    }

    /// Decode the id into its 32 raw bytes (the engine consumes these).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.0).map_err(|e| TypesError::InvalidGroupId(e.to_string()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
