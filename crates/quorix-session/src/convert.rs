//! Wire frame ⇄ engine message conversion.
//!
//! The engine speaks `(payload, from_index, to_index)`; the wire speaks
//! party-id strings and base64 content. Index resolution goes through the
//! ordered `members` list of the group record in both directions.

use quorix_crypto::encoding;
use quorix_engine::EngineMessage;
use quorix_types::{now_ms, GroupInfo, PartyId, ProtocolMessage};

use crate::{Result, SessionError};

/// Convert an inbound peer frame into an engine message.
pub fn to_engine(frame: &ProtocolMessage, group: &GroupInfo) -> Result<EngineMessage> {
    let payload = encoding::b64_decode(&frame.content)?;

    let from_index = group
        .member_index(&frame.from_id)
        .ok_or_else(|| SessionError::BadPeer(frame.from_id.to_string()))?;

    let to_index = if frame.is_broadcast() {
        None
    } else {
        Some(
            group
                .member_index(&frame.to_id)
                .ok_or_else(|| SessionError::BadPeer(frame.to_id.to_string()))?,
        )
    };

    Ok(EngineMessage {
        payload,
        from_index,
        to_index,
    })
}

/// Convert an engine output into a wire frame for the given round.
///
/// The timestamp is stamped here, at wire-format time.
pub fn from_engine(
    message: EngineMessage,
    group: &GroupInfo,
    own_id: &PartyId,
    round: u8,
) -> Result<ProtocolMessage> {
    let to_id = match message.to_index {
        None => PartyId::broadcast(),
        Some(index) => group
            .member_at(index)
            .cloned()
            .ok_or_else(|| SessionError::BadPeer(format!("member index {index}")))?,
    };

    Ok(ProtocolMessage {
        group_id: group.group_id.clone(),
        from_id: own_id.clone(),
        to_id,
        content: encoding::b64_encode(&message.payload),
        round,
        timestamp: now_ms(),
    })
}
