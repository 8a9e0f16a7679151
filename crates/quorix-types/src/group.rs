//! Group records returned by the relay.
//!
//! The `members` list order is authoritative: a member's `index` is its
//! stable 0-based position for the lifetime of the group, and the engine's
//! small-integer party indices are resolved through it.

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, PartyId};
use crate::{Result, TypesError};

/// A registered party, as the relay reports it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// The party's relay handle.
    pub party_id: PartyId,
    /// Unix timestamp of registration, when the relay provides it.
    #[serde(default)]
    pub created_at: u64,
}

/// One member of a group with its stable index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// The member's relay handle.
    pub party_id: PartyId,
    /// The member's 0-based position in the group.
    pub index: u8,
}

/// A group record as returned by `group/info`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupInfo {
    /// The group identifier.
    pub group_id: GroupId,
    /// Total number of parties.
    pub n: u16,
    /// Signing threshold (t-of-n).
    pub t: u16,
    /// Relay-enforced group timeout in minutes.
    #[serde(default)]
    pub timeout: u64,
    /// Unix timestamp of creation.
    #[serde(default)]
    pub created_at: u64,
    /// Unix timestamp of the last update.
    #[serde(default)]
    pub updated_at: u64,
    /// The party that created the group.
    #[serde(default)]
    pub created_by: Option<Party>,
    /// Ordered member list; positions match each member's `index`.
    pub members: Vec<GroupMember>,
    /// Relay-defined group status string.
    #[serde(default)]
    pub status: String,
}

impl GroupInfo {
    /// Check the group invariants: `2 <= t <= n` and member indices
    /// matching their list positions.
    pub fn validate(&self) -> Result<()> {
        if self.t < 2 || self.t > self.n {
            return Err(TypesError::InvalidGroup(format!(
                "threshold {} out of range for {} parties",
                self.t, self.n
            )));
        }
        for (position, member) in self.members.iter().enumerate() {
            if usize::from(member.index) != position {
                return Err(TypesError::InvalidGroup(format!(
                    "member {} has index {} at position {position}",
                    member.party_id, member.index
                )));
            }
        }
        Ok(())
    }

    /// Resolve a party id to its member index.
    pub fn member_index(&self, party_id: &PartyId) -> Option<u8> {
        self.members
            .iter()
            .find(|m| &m.party_id == party_id)
            .map(|m| m.index)
    }

    /// Resolve a member index to its party id.
    pub fn member_at(&self, index: u8) -> Option<&PartyId> {
        self.members
            .get(usize::from(index))
            .map(|m| &m.party_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(prefix: &str, fill: &str, index: u8) -> GroupMember {
        GroupMember {
            party_id: PartyId::new(format!("{prefix}{}", fill.repeat(64))),
            index,
        }
    }

    fn group(n: u16, t: u16) -> GroupInfo {
        GroupInfo {
            group_id: GroupId::new("11".repeat(32)),
            n,
            t,
            timeout: 60,
            created_at: 0,
            updated_at: 0,
            created_by: None,
            members: vec![member("02", "a", 0), member("03", "b", 1), member("02", "c", 2)],
            status: "active".to_string(),
        }
    }

    #[test]
    fn test_valid_group() {
        assert!(group(3, 2).validate().is_ok());
    }

    #[test]
    fn test_threshold_below_two_rejected() {
        assert!(group(3, 1).validate().is_err());
    }

    #[test]
    fn test_threshold_above_n_rejected() {
        assert!(group(3, 4).validate().is_err());
    }

    #[test]
    fn test_index_position_mismatch_rejected() {
        let mut info = group(3, 2);
        info.members[2].index = 5;
        assert!(info.validate().is_err());
    }

    #[test]
    fn test_member_lookup_both_directions() {
        let info = group(3, 2);
        let second = info.members[1].party_id.clone();
        assert_eq!(info.member_index(&second), Some(1));
        assert_eq!(info.member_at(1), Some(&second));
        assert_eq!(info.member_at(7), None);
        assert_eq!(info.member_index(&PartyId::new("02ff")), None);
    }

    #[test]
    fn test_deserialize_relay_shape() {
        let json = r#"{
            "group_id": "1111111111111111111111111111111111111111111111111111111111111111",
            "n": 3,
            "t": 2,
            "timeout": 60,
            "members": [
                {"party_id": "02aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "index": 0}
            ]
        }"#;
        let info: GroupInfo = serde_json::from_str(json).expect("deserialize");
        assert_eq!(info.n, 3);
        assert_eq!(info.members.len(), 1);
        assert!(info.created_by.is_none());
    }
}
