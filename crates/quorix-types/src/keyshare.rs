//! The persisted keyshare record.
//!
//! The engine's share bytes are opaque to the participant; everything else
//! in the record is metadata used to pick a share for signing and to check
//! that all parties of a group agree on the aggregate public key.

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, PartyId};
use crate::{base64_bytes, Result, TypesError};

/// A keyshare produced by keygen or rotation, as persisted by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    /// Opaque engine share bytes (base64 in JSON).
    #[serde(with = "base64_bytes")]
    pub serialized: Vec<u8>,
    /// Aggregate public key, hex; identical across all parties of a group.
    pub public_key: String,
    /// Number of participants that produced this share.
    pub participants: u16,
    /// Signing threshold.
    pub threshold: u16,
    /// The owning party's relay handle.
    pub party_id: PartyId,
    /// The owning party's member index.
    pub party_index: u8,
    /// The group this share belongs to.
    pub group_id: GroupId,
    /// Total number of parties in the group.
    pub total_parties: u16,
    /// Unix milliseconds at which the share was produced.
    pub timestamp: u64,
    /// Optional API credential associated with the share.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl KeyShare {
    /// Check the record invariants.
    pub fn validate(&self) -> Result<()> {
        if u16::from(self.party_index) >= self.total_parties {
            return Err(TypesError::InvalidKeyShare(format!(
                "party index {} out of range for {} parties",
                self.party_index, self.total_parties
            )));
        }
        if self.threshold > self.total_parties {
            return Err(TypesError::InvalidKeyShare(format!(
                "threshold {} exceeds {} parties",
                self.threshold, self.total_parties
            )));
        }
        Ok(())
    }
}
