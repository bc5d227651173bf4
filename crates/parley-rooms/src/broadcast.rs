//! Event fan-out to subscribed connections.
//!
//! The engine resolves a target set through the [`ConnectionRegistry`] and
//! delivers one serialized payload to each target exactly once. Delivery is
//! fire-and-forget: no acknowledgment, no retry, no cross-connection
//! ordering. Per connection, order is preserved — each handle is a FIFO
//! queue, so events enqueue in the order the engine was called.
//!
//! Membership is never re-checked here; subscription gating happened at
//! subscribe time. The hot path touches only the registry snapshot.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use parley_core::events::RoomEvent;
use parley_core::ids::{ConnectionId, RoomId};

use crate::registry::ConnectionRegistry;

/// Maximum total lifetime message drops before forcibly disconnecting a slow client.
const MAX_TOTAL_DROPS: u64 = 100;

/// Resolves targets and fans events out to them.
#[derive(Clone)]
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastEngine {
    /// Create an engine over a registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to every connection currently subscribed to `room`.
    ///
    /// Zero recipients is not an error; the room may have no live
    /// connections.
    pub async fn broadcast_to_room(&self, room: RoomId, event: &RoomEvent) {
        self.fan_out(room, None, event).await;
    }

    /// Deliver `event` to every subscriber of `room` except `sender`'s own
    /// connection — echo suppression for message sends.
    pub async fn broadcast_excluding(
        &self,
        sender: ConnectionId,
        room: RoomId,
        event: &RoomEvent,
    ) {
        self.fan_out(room, Some(sender), event).await;
    }

    /// Single-target delivery, used for direct acknowledgments and error
    /// frames.
    pub async fn send_to(&self, conn: ConnectionId, event: &RoomEvent) {
        let Some(json) = serialize(event) else { return };
        let Some(handle) = self.registry.get(conn).await else {
            debug!(%conn, event_type = event.event_type(), "send_to dead connection, dropping");
            return;
        };
        if !handle.send(json) {
            counter!("room_broadcast_drops_total").increment(1);
            warn!(%conn, event_type = event.event_type(), "failed to send event (queue full)");
        }
    }

    /// Serialize once, fan out to the target snapshot, remove slow clients.
    async fn fan_out(&self, room: RoomId, skip: Option<ConnectionId>, event: &RoomEvent) {
        let Some(json) = serialize(event) else { return };
        let targets = self.registry.resolve(room).await;
        let mut to_remove = Vec::new();
        let mut recipients = 0u32;
        for handle in &targets {
            if skip == Some(handle.id) {
                continue;
            }
            recipients += 1;
            if !handle.send(Arc::clone(&json)) {
                counter!("room_broadcast_drops_total").increment(1);
                let drops = handle.drop_count();
                if drops >= MAX_TOTAL_DROPS {
                    warn!(conn = %handle.id, %room, drops, "disconnecting slow client");
                    to_remove.push(handle.id);
                } else {
                    warn!(conn = %handle.id, %room, total_drops = drops, "failed to send event (queue full)");
                }
            }
        }
        debug!(
            event_type = event.event_type(),
            %room,
            recipients,
            "broadcast event"
        );
        for conn in to_remove {
            let _ = self.registry.remove(conn).await;
        }
    }
}

fn serialize(event: &RoomEvent) -> Option<Arc<String>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use parley_core::ids::UserId;
    use parley_core::profile::PublicProfile;

    use crate::connection::ConnectionHandle;

    async fn subscriber(
        registry: &Arc<ConnectionRegistry>,
        room: RoomId,
        buffer: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<Arc<String>>) {
        let (handle, rx) = ConnectionHandle::channel(ConnectionId::new(), UserId::new(), buffer);
        registry.add(Arc::clone(&handle)).await;
        registry.subscribe(handle.id, room).await;
        (handle, rx)
    }

    fn message_event(room: RoomId, body: &str) -> RoomEvent {
        RoomEvent::Message {
            room_id: room,
            sender: PublicProfile {
                id: UserId::new(),
                name: "sender".into(),
                avatar: None,
            },
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let room = RoomId::new();
        let (_a, mut rx_a) = subscriber(&registry, room, 8).await;
        let (_b, mut rx_b) = subscriber(&registry, room, 8).await;

        engine.broadcast_to_room(room, &message_event(room, "hi")).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_skips_other_rooms() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let (room, other) = (RoomId::new(), RoomId::new());
        let (_a, mut rx_a) = subscriber(&registry, room, 8).await;
        let (_b, mut rx_b) = subscriber(&registry, other, 8).await;

        engine.broadcast_to_room(room, &message_event(room, "hi")).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn excluding_never_delivers_to_sender() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let room = RoomId::new();
        let (sender, mut rx_sender) = subscriber(&registry, room, 8).await;
        let (_other, mut rx_other) = subscriber(&registry, room, 8).await;

        engine
            .broadcast_excluding(sender.id, room, &message_event(room, "hi"))
            .await;

        assert!(rx_sender.try_recv().is_err());
        assert!(rx_other.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_to_targets_one_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let room = RoomId::new();
        let (target, mut rx_target) = subscriber(&registry, room, 8).await;
        let (_other, mut rx_other) = subscriber(&registry, room, 8).await;

        engine
            .send_to(
                target.id,
                &RoomEvent::Error {
                    code: "not_found".into(),
                    message: "no such room".into(),
                },
            )
            .await;

        let frame = rx_target.try_recv().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["type"], "room:error");
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_unknown_connection_is_silent() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        engine
            .send_to(ConnectionId::new(), &message_event(RoomId::new(), "hi"))
            .await;
    }

    #[tokio::test]
    async fn broadcast_to_empty_room_is_not_an_error() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let room = RoomId::new();
        engine.broadcast_to_room(room, &message_event(room, "hi")).await;
    }

    #[tokio::test]
    async fn payload_is_shared_not_cloned() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let room = RoomId::new();
        let (_a, mut rx_a) = subscriber(&registry, room, 8).await;
        let (_b, mut rx_b) = subscriber(&registry, room, 8).await;

        engine.broadcast_to_room(room, &message_event(room, "hi")).await;

        let one = rx_a.recv().await.unwrap();
        let two = rx_b.recv().await.unwrap();
        assert!(Arc::ptr_eq(&one, &two));
    }

    #[tokio::test]
    async fn per_connection_order_follows_issue_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let room = RoomId::new();
        let (_a, mut rx) = subscriber(&registry, room, 16).await;

        for i in 0..5 {
            engine
                .broadcast_to_room(room, &message_event(room, &i.to_string()))
                .await;
        }

        for i in 0..5 {
            let frame = rx.recv().await.unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(parsed["body"], i.to_string());
        }
    }

    #[tokio::test]
    async fn slow_client_is_disconnected_after_threshold() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let room = RoomId::new();
        // Slow client: buffer of one, never drained.
        let (_slow, _rx_slow) = subscriber(&registry, room, 1).await;
        let (_fast, mut rx_fast) = subscriber(&registry, room, 512).await;
        assert_eq!(registry.connection_count(), 2);

        let event = message_event(room, "x");
        // First send fills the slow client's buffer, then exceed the threshold.
        for _ in 0..=MAX_TOTAL_DROPS {
            engine.broadcast_to_room(room, &event).await;
        }

        assert_eq!(registry.connection_count(), 1);
        assert!(rx_fast.try_recv().is_ok());
    }

    #[tokio::test]
    async fn fast_client_survives_sustained_traffic() {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let room = RoomId::new();
        let (_fast, mut rx) = subscriber(&registry, room, 8).await;

        let event = message_event(room, "x");
        for _ in 0..200 {
            engine.broadcast_to_room(room, &event).await;
            while rx.try_recv().is_ok() {}
        }

        assert_eq!(registry.connection_count(), 1);
    }
}
