//! # quorix-engine
//!
//! The boundary to the black-box threshold-ECDSA engine.
//!
//! The engine performs the actual multi-party cryptography; this crate
//! only defines the message shape it exchanges, the session capabilities
//! the participant core relies on, and a deterministic [`mock`] engine
//! that scripts byte payloads so the round state machines are testable
//! without the real engine.
//!
//! Engine sessions are owned exclusively by their protocol driver and
//! released on drop, on success and failure paths alike. All engine calls
//! are synchronous.

pub mod mock;

use serde::{Deserialize, Serialize};

/// Error types for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine rejected its inputs (malformed payload, unexpected
    /// round, missing partial).
    #[error("engine protocol error: {0}")]
    Protocol(String),

    /// Session parameters were invalid.
    #[error("invalid engine parameters: {0}")]
    InvalidParameters(String),

    /// A keyshare blob could not be decoded.
    #[error("keyshare decode error: {0}")]
    Keyshare(String),
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// One message exchanged with the engine.
///
/// `to_index` of `None` means broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMessage {
    /// Opaque protocol payload.
    pub payload: Vec<u8>,
    /// Sender's member index.
    pub from_index: u8,
    /// Recipient's member index, absent for broadcast.
    pub to_index: Option<u8>,
}

/// Parameters for a keygen (or rotation) engine session.
#[derive(Clone, Debug)]
pub struct KeygenParams {
    /// Total number of parties.
    pub total_parties: u16,
    /// Signing threshold.
    pub threshold: u16,
    /// This party's member index.
    pub party_index: u8,
    /// Raw group id bytes, mixed into the protocol transcript.
    pub group_id: Vec<u8>,
    /// Optional caller-supplied entropy.
    pub seed: Option<[u8; 32]>,
    /// Whether distributed keygen is used (as opposed to trusted dealer).
    pub distributed: bool,
    /// Prior keyshare bytes; present for rotation, which preserves the
    /// aggregate public key while replacing shares.
    pub prior_keyshare: Option<Vec<u8>>,
}

/// Parameters for a signing engine session.
#[derive(Clone, Debug)]
pub struct SignParams {
    /// The signer's keyshare bytes.
    pub keyshare: Vec<u8>,
    /// BIP32-style derivation path; `"m"` signs with the root key.
    pub derivation_path: String,
    /// Engine-specific extra data.
    pub extra: Option<Vec<u8>>,
}

impl SignParams {
    /// Parameters signing with the root key.
    pub fn root(keyshare: Vec<u8>) -> Self {
        Self {
            keyshare,
            derivation_path: "m".to_string(),
            extra: None,
        }
    }
}

/// The keyshare material a keygen session yields after its last round.
#[derive(Clone, Debug)]
pub struct EngineKeyshare {
    /// Opaque share bytes, persisted as-is.
    pub serialized: Vec<u8>,
    /// Aggregate public key (compressed point bytes).
    pub public_key: Vec<u8>,
    /// Number of participants.
    pub participants: u16,
    /// Signing threshold.
    pub threshold: u16,
    /// This party's member index.
    pub party_index: u8,
}

/// An ECDSA signature as the engine emits it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// The r scalar bytes.
    pub r: Vec<u8>,
    /// The s scalar bytes.
    pub s: Vec<u8>,
}

/// A keygen session in progress.
pub trait KeygenProtocol: Send {
    /// Produce the round-1 message that opens the protocol.
    fn create_first_message(&mut self) -> Result<EngineMessage>;

    /// Feed one round's worth of peer messages; returns the messages to
    /// send for the next round (empty after the final round).
    fn handle_messages(&mut self, messages: Vec<EngineMessage>) -> Result<Vec<EngineMessage>>;

    /// The keyshare, available once the final round has been processed.
    fn keyshare(&mut self) -> Result<EngineKeyshare>;
}

/// A signing session in progress.
pub trait SignProtocol: Send {
    /// Produce the round-1 message for the given 32-byte message hash.
    fn create_first_message(&mut self, message_hash: &[u8; 32]) -> Result<EngineMessage>;

    /// Feed one round's worth of peer messages; returns the messages to
    /// send for the next round (empty when the partial is pending).
    fn handle_messages(&mut self, messages: Vec<EngineMessage>) -> Result<Vec<EngineMessage>>;

    /// This party's partial signature, available after round 3.
    fn last_message(&mut self, message_hash: &[u8; 32]) -> Result<EngineMessage>;

    /// Combine the peers' partials (the engine holds this party's own)
    /// into the final `(r, s)` signature.
    fn combine(&mut self, partials: Vec<EngineMessage>) -> Result<Signature>;
}

/// Factory for engine sessions.
pub trait Engine: Send + Sync {
    /// Open a keygen (or rotation) session.
    fn keygen(&self, params: KeygenParams) -> Result<Box<dyn KeygenProtocol>>;

    /// Open a signing session.
    fn sign(&self, params: SignParams) -> Result<Box<dyn SignProtocol>>;
}
