//! The live-reload bus.
//!
//! Fan-out of typed engine events to any number of subscribed client
//! sessions (in practice, WebSocket connections). Delivery is best-effort:
//! a subscriber that stops receiving lags out of the broadcast channel and
//! is dropped by its session task. Within one subscriber, emissions arrive
//! in the order they were enqueued; across subscribers no order is promised.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::sync::SyncStatus;

/// Per-process buffer for slow subscribers before they start lagging.
const BUS_CAPACITY: usize = 256;

/// A typed bus event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum BusEvent {
    /// Force clients to re-fetch everything.
    Reload,
    /// One document was added or changed.
    Update {
        /// Workspace-relative path.
        path: String,
    },
    /// One document was removed.
    Remove {
        /// Workspace-relative path.
        path: String,
    },
    /// A configured peer came online.
    PeerOnline {
        /// Peer display name.
        peer: String,
        /// `host:port` of the peer.
        host: String,
    },
    /// A configured peer went offline.
    PeerOffline {
        /// Peer display name.
        peer: String,
        /// `host:port` of the peer.
        host: String,
    },
    /// A pushed document landed in the inbox.
    PeerDocumentReceived {
        /// Workspace-relative path of the new inbox file.
        path: String,
    },
    /// An adopted document's sync status changed.
    SyncStatusChanged {
        /// Workspace-relative path.
        path: String,
        /// Status before the transition.
        old_status: SyncStatus,
        /// Status after the transition.
        new_status: SyncStatus,
        /// Origin peer name, when the transition involves one.
        #[serde(skip_serializing_if = "Option::is_none")]
        peer: Option<String>,
    },
}

/// A bus event stamped with its wall-clock emission time.
#[derive(Debug, Clone, Serialize)]
pub struct Emission {
    /// The event payload, flattened into the JSON object.
    #[serde(flatten)]
    pub event: BusEvent,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Fan-out channel for engine events.
#[derive(Debug, Clone)]
pub struct LiveReloadBus {
    tx: broadcast::Sender<Emission>,
}

impl LiveReloadBus {
    /// Create a bus with no subscribers.
    pub fn new() -> LiveReloadBus {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        LiveReloadBus { tx }
    }

    /// Subscribe a new session. The receiver yields emissions in enqueue
    /// order; dropping it unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Emission> {
        self.tx.subscribe()
    }

    /// Emit one event to all current subscribers.
    pub fn emit(&self, event: BusEvent) {
        let emission = Emission {
            event,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        };
        // Send fails only when nobody is listening, which is fine.
        let _ = self.tx.send(emission);
    }

    /// Current subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LiveReloadBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = LiveReloadBus::new();
        let mut rx = bus.subscribe();

        bus.emit(BusEvent::Update {
            path: "a.md".into(),
        });
        bus.emit(BusEvent::Remove {
            path: "a.md".into(),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first.event, BusEvent::Update { .. }));
        assert!(matches!(second.event, BusEvent::Remove { .. }));
        assert!(first.timestamp > 0);
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = LiveReloadBus::new();
        bus.emit(BusEvent::Reload);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_wire_format() {
        let emission = Emission {
            event: BusEvent::SyncStatusChanged {
                path: "knowledge/x.md".into(),
                old_status: SyncStatus::Synced,
                new_status: SyncStatus::LocalModified,
                peer: Some("desk".into()),
            },
            timestamp: 1234,
        };
        let json = serde_json::to_value(&emission).unwrap();
        assert_eq!(json["type"], "sync-status-changed");
        assert_eq!(json["oldStatus"], "synced");
        assert_eq!(json["newStatus"], "local-modified");
        assert_eq!(json["peer"], "desk");
        assert_eq!(json["timestamp"], 1234);
    }

    #[test]
    fn test_peer_event_wire_format() {
        let json = serde_json::to_value(BusEvent::PeerOnline {
            peer: "laptop".into(),
            host: "10.0.0.2:3847".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "peer-online");
        assert_eq!(json["host"], "10.0.0.2:3847");
    }
}
