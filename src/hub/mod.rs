//! Hub-facing publish port and its event-bus implementation.
//!
//! The core never holds a back-reference into the hub SDK; entities publish
//! through the [`HubRegistry`] port injected at construction. The default
//! implementation fans out over a tokio broadcast bus so the hub transport,
//! loggers and tests can all subscribe independently. Publishing is
//! fire-and-forget: a send with no subscribers is not an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::entity::EntityState;

/// Overall device status reported to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Registry/publish port toward the hub. All operations are
/// fire-and-forget; implementations log failures and never propagate them.
pub trait HubRegistry: Send + Sync {
    /// Push a fresh attribute snapshot for an entity.
    fn update(&self, entity_id: &str, snapshot: &EntityState);

    /// Register a new entity with the hub.
    fn add_entity(&self, entity_id: &str, name: &str);

    /// Remove an entity from the hub.
    fn remove_entity(&self, entity_id: &str);

    /// Report the overall device status.
    fn set_device_state(&self, state: DeviceState);
}

/// Event types published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusEvent {
    EntityAdded {
        entity_id: String,
        name: String,
    },
    EntityRemoved {
        entity_id: String,
    },
    EntityUpdated {
        entity_id: String,
        attributes: EntityState,
    },
    DeviceStateChanged {
        state: DeviceState,
    },
}

/// Event bus handle for publishing and subscribing.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: BusEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing.
pub type SharedBus = Arc<EventBus>;

/// Create a new shared event bus with default capacity.
pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}

/// [`HubRegistry`] implementation that publishes onto the event bus.
pub struct BusRegistry {
    bus: SharedBus,
}

impl BusRegistry {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }
}

impl HubRegistry for BusRegistry {
    fn update(&self, entity_id: &str, snapshot: &EntityState) {
        self.bus.publish(BusEvent::EntityUpdated {
            entity_id: entity_id.to_string(),
            attributes: snapshot.clone(),
        });
    }

    fn add_entity(&self, entity_id: &str, name: &str) {
        self.bus.publish(BusEvent::EntityAdded {
            entity_id: entity_id.to_string(),
            name: name.to_string(),
        });
    }

    fn remove_entity(&self, entity_id: &str) {
        self.bus.publish(BusEvent::EntityRemoved {
            entity_id: entity_id.to_string(),
        });
    }

    fn set_device_state(&self, state: DeviceState) {
        self.bus.publish(BusEvent::DeviceStateChanged { state });
    }
}
