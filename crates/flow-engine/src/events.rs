//! Change notifications for space observers
//!
//! The store emits a `SpaceEvent` after every successful mutation so the
//! UI (or any other consumer) can re-render without polling.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::types::{Connection, ModuleId, ModuleStatus};

/// Receiver of space change events
///
/// Implementations forward events to whatever is watching the space: a
/// UI channel, a log, a test recorder.
pub trait EventSink: Send + Sync {
    /// Deliver one event
    ///
    /// `EventError::Disconnected` tells the store to drop this sink.
    fn send(&self, event: SpaceEvent) -> Result<(), EventError>;
}

/// Failure to deliver a space event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The consumer went away; the sink will never accept events again
    #[error("event consumer disconnected")]
    Disconnected,

    /// The consumer refused this event but may accept later ones
    #[error("event rejected: {0}")]
    Rejected(String),
}

/// Events emitted when the space changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SpaceEvent {
    /// A module was created
    #[serde(rename_all = "camelCase")]
    ModuleAdded { space_id: String, module_id: ModuleId },

    /// A module's fields were merged
    #[serde(rename_all = "camelCase")]
    ModuleUpdated {
        space_id: String,
        module_id: ModuleId,
        status: ModuleStatus,
    },

    /// A module was deleted together with its connections
    #[serde(rename_all = "camelCase")]
    ModuleDeleted {
        space_id: String,
        module_id: ModuleId,
        removed_connections: Vec<String>,
    },

    /// A validated connection was inserted
    #[serde(rename_all = "camelCase")]
    ConnectionAdded { space_id: String, connection: Connection },

    /// A connection was removed
    #[serde(rename_all = "camelCase")]
    ConnectionDeleted { space_id: String, connection_id: String },

    /// Downstream modules were marked invalid
    #[serde(rename_all = "camelCase")]
    ModulesInvalidated {
        space_id: String,
        source_module_id: ModuleId,
        module_ids: Vec<ModuleId>,
    },

    /// The whole space was replaced (restore, undo, redo)
    #[serde(rename_all = "camelCase")]
    SpaceRestored { space_id: String, module_count: usize },
}

impl SpaceEvent {
    /// Id of the space the event belongs to
    pub fn space_id(&self) -> &str {
        match self {
            SpaceEvent::ModuleAdded { space_id, .. }
            | SpaceEvent::ModuleUpdated { space_id, .. }
            | SpaceEvent::ModuleDeleted { space_id, .. }
            | SpaceEvent::ConnectionAdded { space_id, .. }
            | SpaceEvent::ConnectionDeleted { space_id, .. }
            | SpaceEvent::ModulesInvalidated { space_id, .. }
            | SpaceEvent::SpaceRestored { space_id, .. } => space_id,
        }
    }
}

/// Forwards events into a bounded tokio channel
///
/// A full channel rejects the event without blocking the store. Dropping
/// the receiver disconnects the sink.
pub struct ChannelSink {
    tx: mpsc::Sender<SpaceEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SpaceEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: SpaceEvent) -> Result<(), EventError> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(event) => {
                EventError::Rejected(format!("channel full, dropped event for space '{}'", event.space_id()))
            }
            TrySendError::Closed(_) => EventError::Disconnected,
        })
    }
}

/// Keeps every event in memory, in delivery order
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<SpaceEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events received so far
    pub fn events(&self) -> Vec<SpaceEvent> {
        self.lock().clone()
    }

    /// Remove and return the events received so far
    pub fn take(&self) -> Vec<SpaceEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SpaceEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for EventLog {
    fn send(&self, event: SpaceEvent) -> Result<(), EventError> {
        self.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(module_id: &str) -> SpaceEvent {
        SpaceEvent::ModuleAdded {
            space_id: "s".to_string(),
            module_id: module_id.to_string(),
        }
    }

    #[test]
    fn test_event_log_take_drains() {
        let log = EventLog::new();
        log.send(added("m1")).unwrap();
        log.send(added("m2")).unwrap();

        assert_eq!(log.take(), vec![added("m1"), added("m2")]);
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_channel_sink_delivers_until_receiver_dropped() {
        let (sink, mut rx) = ChannelSink::new(8);
        sink.send(added("m1")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), added("m1"));

        drop(rx);
        assert_eq!(sink.send(added("m2")), Err(EventError::Disconnected));
    }

    #[test]
    fn test_full_channel_rejects_without_blocking() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.send(added("m1")).unwrap();
        assert!(matches!(sink.send(added("m2")), Err(EventError::Rejected(_))));

        assert_eq!(rx.try_recv().unwrap(), added("m1"));
        sink.send(added("m3")).unwrap();
    }

    #[test]
    fn test_space_id_accessor() {
        let event = SpaceEvent::SpaceRestored {
            space_id: "launch".to_string(),
            module_count: 2,
        };
        assert_eq!(event.space_id(), "launch");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SpaceEvent::ModulesInvalidated {
            space_id: "s".to_string(),
            source_module_id: "a".to_string(),
            module_ids: vec!["b".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "modulesInvalidated");
        assert_eq!(json["sourceModuleId"], "a");
    }
}
