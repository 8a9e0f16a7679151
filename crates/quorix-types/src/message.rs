//! The `ProtocolMessage` wire frame.
//!
//! Every frame on the relay socket is one JSON-serialized
//! [`ProtocolMessage`]. Round 0 carries the server's `START` sentinel,
//! rounds 1..=4 carry protocol content (base64, encrypted in transit for
//! peer-to-peer frames), and round 5 is reserved for the terminal
//! `DONE` / `END:<status>` handshake.

use serde::{Deserialize, Serialize};

use crate::ids::{GroupId, PartyId};
use crate::now_ms;

/// Round number of the server's `START` sentinel.
pub const START_ROUND: u8 = 0;

/// First protocol round.
pub const FIRST_ROUND: u8 = 1;

/// Last protocol round.
pub const LAST_ROUND: u8 = 4;

/// Round number reserved for terminal frames.
pub const TERMINAL_ROUND: u8 = 5;

/// Content of the participant's local-completion frame.
pub const DONE_CONTENT: &str = "DONE";

/// Prefix of the server's terminal status frame.
pub const END_PREFIX: &str = "END:";

/// Terminal status signalling a successful session.
pub const END_SUCCESS: &str = "SUCCESS";

/// One frame on the relay socket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    /// The group this frame belongs to.
    pub group_id: GroupId,
    /// Sender id, or [`crate::SERVER_ID`] for relay control frames.
    pub from_id: PartyId,
    /// Recipient id, or `"0"` for broadcast.
    pub to_id: PartyId,
    /// Base64 payload for peer frames; a control verb for server frames.
    pub content: String,
    /// Round number (see the round constants in this module).
    pub round: u8,
    /// Unix milliseconds, stamped at wire-format time.
    pub timestamp: u64,
}

impl ProtocolMessage {
    /// Whether this frame is addressed to every peer.
    pub fn is_broadcast(&self) -> bool {
        self.to_id.is_broadcast()
    }

    /// Whether this frame originates from the relay.
    pub fn is_from_server(&self) -> bool {
        self.from_id.is_server()
    }

    /// Whether this is the server's session-start sentinel.
    pub fn is_start(&self) -> bool {
        self.is_from_server() && (self.content == "start" || self.content == "START")
    }

    /// Whether this is the participant's local-completion frame.
    pub fn is_done(&self) -> bool {
        self.content == DONE_CONTENT && self.to_id.is_server()
    }

    /// The status carried by a server `END:<status>` frame, if this is one.
    pub fn end_status(&self) -> Option<&str> {
        if !self.is_from_server() {
            return None;
        }
        self.content.strip_prefix(END_PREFIX)
    }

    /// Build the `DONE` frame announcing local completion to the relay.
    pub fn done(group_id: GroupId, from_id: PartyId) -> Self {
        Self {
            group_id,
            from_id,
            to_id: PartyId::server(),
            content: DONE_CONTENT.to_string(),
            round: TERMINAL_ROUND,
            timestamp: now_ms(),
        }
    }
}
