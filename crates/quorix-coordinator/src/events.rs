//! Completion and error events.
//!
//! Events are pushed to subscribers over a tokio broadcast channel; a
//! subscriber that falls behind loses the oldest events, which is
//! acceptable because every event is also reflected in coordinator
//! state (persisted keyshares, returned errors).

use tokio::sync::broadcast;

use quorix_engine::Signature;
use quorix_types::KeyShare;

/// Default event buffer per subscriber.
pub const EVENT_CAPACITY: usize = 64;

/// An event emitted by the coordinator.
#[derive(Clone, Debug)]
pub enum CoordinatorEvent {
    /// Keygen finished; the record has been persisted.
    KeygenComplete(KeyShare),
    /// Rotation finished; the prior generation is backed up.
    RotationComplete(KeyShare),
    /// Signing finished with the final `(r, s)`.
    SigningComplete(Signature),
    /// The active session failed and was destroyed.
    SessionError(String),
}

/// Broadcast bus for coordinator events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoordinatorEvent>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: CoordinatorEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    /// Open a new subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}
