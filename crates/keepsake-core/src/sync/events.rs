//! Typed in-process event bus.
//!
//! Engines publish here after mutating the local store; UI layers subscribe
//! and re-render the slices they care about. Nothing ever blocks on a slow
//! or absent subscriber.

use tokio::sync::broadcast;

use crate::models::EntityKind;

const BUS_CAPACITY: usize = 128;

/// Something a UI layer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A row was created or replaced locally (by any engine).
    EntityChanged { entity: EntityKind, id: String },
    /// A row was removed locally.
    EntityRemoved { entity: EntityKind, id: String },
    /// An outbox drain pass finished.
    OutboxDrained { synced: usize, failed: usize },
    /// A pull pass finished.
    PullCompleted { applied: usize },
}

/// Broadcast fan-out for [`SyncEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A bus with no subscribers swallows it.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
