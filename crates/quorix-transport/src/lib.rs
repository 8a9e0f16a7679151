//! # quorix-transport
//!
//! The full-duplex message channel between a participant and the relay.
//!
//! One WebSocket carries JSON-framed [`quorix_types::ProtocolMessage`]s
//! for the lifetime of a session. Peer-to-peer content is AES-256-GCM
//! encrypted with the session key; relay control frames and the `DONE`
//! status frame pass through in the clear (see [`frame`] for the exact
//! policy). The channel does not reconnect by itself — the coordinator
//! re-invokes [`channel::Transport::connect`] while a session is live.
//!
//! ## Modules
//!
//! - [`frame`] — content encryption policy, seal/open transforms
//! - [`channel`] — socket lifecycle, bounded outgoing ring, receive loop

pub mod channel;
pub mod frame;

pub use channel::{Transport, TransportConfig};

/// Error types for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket did not open within the connect timeout.
    #[error("socket connect timed out")]
    ConnectTimeout,

    /// Socket open/read/write failure.
    #[error("socket error: {0}")]
    Socket(String),

    /// A frame could not be serialized for the wire.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Content encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] quorix_crypto::CryptoError),

    /// The socket URL could not be constructed.
    #[error("invalid socket URL: {0}")]
    Url(String),
}

/// Convenience result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
