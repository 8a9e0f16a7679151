//! Shared fixtures for the end-to-end scenarios.
//!
//! The tests drive real coordinators against the in-process relay
//! [`hub`], with the deterministic mock engine standing in for the
//! cryptographic engine. Relay HTTP is not simulated: coordinators are
//! seeded through the restore paths (`set_credentials`, `set_group`),
//! which is exactly the cold-start rehydration flow.

pub mod hub;

use std::sync::Once;

use quorix_types::{GroupId, GroupInfo, GroupMember, PartyId};

/// Group id used across the scenarios (64 hex chars).
pub fn test_group_id() -> GroupId {
    GroupId::new("11".repeat(32))
}

/// Deterministic party ids: `02…01`, `03…02`, `02…03`.
pub fn test_party_id(index: u8) -> PartyId {
    let prefix = if index % 2 == 0 { "02" } else { "03" };
    PartyId::new(format!(
        "{prefix}{}",
        format!("{:02x}", index + 1).repeat(32)
    ))
}

/// A t-of-n group over the deterministic party ids.
pub fn test_group(t: u16, n: u16) -> GroupInfo {
    GroupInfo {
        group_id: test_group_id(),
        n,
        t,
        timeout: 60,
        created_at: 1_700_000_000,
        updated_at: 1_700_000_000,
        created_by: None,
        members: (0..n)
            .map(|i| {
                let index = u8::try_from(i).unwrap_or(0);
                GroupMember {
                    party_id: test_party_id(index),
                    index,
                }
            })
            .collect(),
        status: "active".to_string(),
    }
}

/// The fixed 32-byte message hash from the signing scenario.
pub fn test_message_hash() -> [u8; 32] {
    core::array::from_fn(|i| u8::try_from(i + 1).unwrap_or(0))
}

static TRACING: Once = Once::new();

/// Install a tracing subscriber once; controlled via `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
