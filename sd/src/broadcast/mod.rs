//! Realtime broadcast sink
//!
//! Fire-and-forget fan-out of session activity to external subscribers
//! (UI, log tails). Delivery is unreliable by contract: a full channel
//! drops oldest events and a missing subscriber drops everything.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// A published realtime event
#[derive(Debug, Clone)]
pub struct BroadcastEvent {
    /// Topic, e.g. `session.iteration`, `checklist.updated`, `activity.new`
    pub event_type: String,
    /// JSON payload
    pub payload: Value,
}

/// Fire-and-forget publish sink
pub trait Broadcaster: Send + Sync {
    /// Publish an event; never blocks, never fails
    fn publish(&self, event_type: &str, payload: Value);
}

/// Broadcaster over a tokio broadcast channel
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "ChannelBroadcaster::new: called");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Subscribe to receive events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, event_type: &str, payload: Value) {
        debug!(%event_type, "ChannelBroadcaster::publish");
        // No subscribers is fine; the event is simply dropped
        let _ = self.tx.send(BroadcastEvent {
            event_type: event_type.to_string(),
            payload,
        });
    }
}

/// Broadcaster that drops everything (for tests and headless runs)
#[derive(Default)]
pub struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
    fn publish(&self, _event_type: &str, _payload: Value) {}
}
