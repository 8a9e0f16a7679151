//! # quorix-coordinator
//!
//! The public façade of the participant library.
//!
//! A [`Coordinator`] owns one relay client, one transport, one keyshare
//! store, and at most one active session (keygen xor signing). External
//! callers interact only with it: registration and group management go
//! to the relay, session starts wire a protocol driver to the transport,
//! inbound frames are routed to the live session, and session outputs
//! are deduplicated, queued, and drained to the relay in order.
//!
//! ## Modules
//!
//! - [`config`] — runtime configuration
//! - [`events`] — the broadcast event bus for completion and errors
//! - [`coordinator`] — the façade itself

pub mod config;
pub mod coordinator;
pub mod events;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use events::{CoordinatorEvent, EventBus};

/// Error types for coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Missing or invalid configuration (no group, no credentials, bad
    /// parameters).
    #[error("configuration error: {0}")]
    Config(String),

    /// A session is already active.
    #[error("a session is already active")]
    Busy,

    /// The message hash is not exactly 32 bytes.
    #[error("message hash must be 32 bytes, got {actual}")]
    BadHash {
        /// Actual hash length in bytes.
        actual: usize,
    },

    /// Relay HTTP failure.
    #[error(transparent)]
    Relay(#[from] quorix_relay::RelayError),

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] quorix_transport::TransportError),

    /// Session failure.
    #[error(transparent)]
    Session(#[from] quorix_session::SessionError),

    /// Token failure.
    #[error(transparent)]
    Token(#[from] quorix_token::TokenError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] quorix_store::StoreError),

    /// Engine failure.
    #[error(transparent)]
    Engine(#[from] quorix_engine::EngineError),
}

/// Convenience result type for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;
