//! Broadcast event bus for distributing `ForgeEvent` to subscribers.
//!
//! Built on `tokio::sync::broadcast`. Consumers (audit writer,
//! structured-logging bridge, metrics) subscribe without the engine
//! knowing about them; publishing with no active subscribers is a
//! no-op.

use forgeflow_types::event::ForgeEvent;
use tokio::sync::broadcast;

/// Multi-consumer bus for workflow lifecycle events.
///
/// Cloning the bus clones the sender, allowing multiple producers and
/// consumers.
pub struct EventBus {
    sender: broadcast::Sender<ForgeEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ForgeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no subscribers, the event is silently dropped.
    pub fn publish(&self, event: ForgeEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
