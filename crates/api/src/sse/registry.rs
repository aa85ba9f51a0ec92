//! Per-process registry of live SSE connections.
//!
//! Connections are keyed by the generation-request id the client watches.
//! The map is mutated from the request path (register), the event-delivery
//! path (prune on send failure), and each connection's drop guard
//! (deregister), so it sits behind a plain mutex; no lock is ever held
//! across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use meshgen_core::types::DbId;
use meshgen_events::TaskEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

/// What flows through a connection's channel. Frames are rendered to the
/// SSE wire format at the stream edge.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Event(TaskEvent),
    /// Keep-alive comment frame.
    Ping,
}

struct SseConnection {
    id: Uuid,
    sender: mpsc::UnboundedSender<OutboundFrame>,
}

/// All live SSE connections of this process.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<DbId, Vec<SseConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a task. Returns the connection id (for
    /// later removal) and the receiver half feeding the SSE stream.
    pub fn add(&self, task_id: DbId) -> (Uuid, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.connections
            .lock()
            .expect("registry mutex poisoned")
            .entry(task_id)
            .or_default()
            .push(SseConnection { id, sender: tx });
        (id, rx)
    }

    /// Remove one connection. The task's entry disappears with its last
    /// connection so the map never accumulates empty sets.
    pub fn remove(&self, task_id: DbId, conn_id: Uuid) {
        let mut connections = self.connections.lock().expect("registry mutex poisoned");
        if let Some(conns) = connections.get_mut(&task_id) {
            conns.retain(|c| c.id != conn_id);
            if conns.is_empty() {
                connections.remove(&task_id);
            }
        }
    }

    /// Deliver an event to every connection watching its task.
    ///
    /// A send failure means the receiver is gone; the failed connection is
    /// pruned without affecting its siblings. Returns how many connections
    /// accepted the frame.
    pub fn send_to_task(&self, event: &TaskEvent) -> usize {
        let mut connections = self.connections.lock().expect("registry mutex poisoned");
        let Some(conns) = connections.get_mut(&event.task_id) else {
            return 0;
        };
        let before = conns.len();
        conns.retain(|c| c.sender.send(OutboundFrame::Event(event.clone())).is_ok());
        let delivered = conns.len();
        if delivered < before {
            tracing::debug!(
                task_id = event.task_id,
                pruned = before - delivered,
                "Pruned dead SSE connections"
            );
        }
        if conns.is_empty() {
            connections.remove(&event.task_id);
        }
        delivered
    }

    /// Send a keep-alive frame to every connection. A heartbeat failure is
    /// a delivery failure: the connection is pruned.
    pub fn ping_all(&self) {
        let mut connections = self.connections.lock().expect("registry mutex poisoned");
        for conns in connections.values_mut() {
            conns.retain(|c| c.sender.send(OutboundFrame::Ping).is_ok());
        }
        connections.retain(|_, conns| !conns.is_empty());
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .expect("registry mutex poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Drop every sender, ending all streams. Used at shutdown.
    pub fn shutdown_all(&self) {
        let mut connections = self.connections.lock().expect("registry mutex poisoned");
        let count: usize = connections.values().map(Vec::len).sum();
        connections.clear();
        tracing::info!(count, "Closed all SSE connections");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use meshgen_events::EventType;

    fn event(task_id: DbId) -> TaskEvent {
        TaskEvent::new(task_id, EventType::TaskUpdated, serde_json::json!({}))
    }

    #[test]
    fn entry_disappears_with_last_connection() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = registry.add(1);
        let (b, _rx_b) = registry.add(1);
        assert_eq!(registry.connection_count(), 2);

        registry.remove(1, a);
        assert_eq!(registry.connection_count(), 1);
        registry.remove(1, b);
        assert_eq!(registry.connection_count(), 0);
        // A later send must find no entry, not an empty set.
        assert_eq!(registry.send_to_task(&event(1)), 0);
    }

    #[test]
    fn all_connections_for_a_task_receive() {
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = registry.add(7);
        let (_b, mut rx_b) = registry.add(7);
        let (_c, mut rx_c) = registry.add(8);

        assert_eq!(registry.send_to_task(&event(7)), 2);
        assert_matches!(rx_a.try_recv(), Ok(OutboundFrame::Event(e)) if e.task_id == 7);
        assert_matches!(rx_b.try_recv(), Ok(OutboundFrame::Event(e)) if e.task_id == 7);
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn dead_connection_is_pruned_without_affecting_siblings() {
        let registry = ConnectionRegistry::new();
        let (_a, rx_a) = registry.add(3);
        let (_b, mut rx_b) = registry.add(3);
        drop(rx_a);

        assert_eq!(registry.send_to_task(&event(3)), 1);
        assert_eq!(registry.connection_count(), 1);
        assert_matches!(rx_b.try_recv(), Ok(OutboundFrame::Event(_)));
    }

    #[test]
    fn heartbeat_failure_prunes_like_delivery_failure() {
        let registry = ConnectionRegistry::new();
        let (_a, rx_a) = registry.add(4);
        drop(rx_a);

        registry.ping_all();
        assert_eq!(registry.connection_count(), 0);
    }
}
