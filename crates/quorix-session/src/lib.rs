//! # quorix-session
//!
//! Round-driven protocol state machines for keygen, rotation, and signing.
//!
//! All round mechanics — buffering, duplicate suppression, broadcast vs
//! point-to-point filtering, completion detection, and the `DONE`/`END`
//! terminal handshake — live in the generic [`session::Session`]. The two
//! protocol drivers supply what differs between key generation and
//! signing: which engine calls run per round, how many peer frames a
//! round needs, and what artifact completion yields.
//!
//! ## Modules
//!
//! - [`session`] — the shared round pipeline and the driver trait
//! - [`convert`] — wire frame ⇄ engine message conversion
//! - [`keygen`] — DKG and rotation driver; produces a persisted keyshare
//! - [`sign`] — DSG driver; round-3 partial, round-4 combine, `(r, s)`

pub mod convert;
pub mod keygen;
pub mod sign;
pub mod session;

pub use keygen::{KeygenDriver, KeygenOptions};
pub use session::{Progress, ProtocolDriver, Session};
pub use sign::SignDriver;

/// Error types for session processing.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A frame named a party the group does not contain, or an engine
    /// message named an out-of-range index.
    #[error("unknown peer: {0}")]
    BadPeer(String),

    /// The session or its inputs violated the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The engine rejected its inputs.
    #[error(transparent)]
    Engine(#[from] quorix_engine::EngineError),

    /// Payload decoding or decryption failed.
    #[error(transparent)]
    Crypto(#[from] quorix_crypto::CryptoError),

    /// Persisting the session artifact failed.
    #[error(transparent)]
    Store(#[from] quorix_store::StoreError),

    /// The group record or keyshare record was invalid.
    #[error(transparent)]
    Record(#[from] quorix_types::TypesError),

    /// The relay terminated the session with a non-success status.
    #[error("session ended: {0}")]
    EndedNonSuccess(String),
}

/// Convenience result type for session processing.
pub type Result<T> = std::result::Result<T, SessionError>;
