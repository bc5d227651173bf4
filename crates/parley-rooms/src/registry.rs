//! Connection Registry: connection ↔ room routing entries.
//!
//! The registry knows which live connections should receive a room's
//! broadcasts. It is deliberately membership-agnostic: authorization happens
//! in the coordinator at subscribe time, never here, so the delivery hot
//! path stays free of directory lookups.
//!
//! All three maps (handles, room → connections, connection → rooms) sit
//! behind a single lock; the registry is the unit of consistency for
//! routing state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use parley_core::ids::{ConnectionId, RoomId, UserId};

use crate::connection::ConnectionHandle;

#[derive(Default)]
struct RegistryState {
    /// Live connection handles by ID.
    handles: HashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// Delivery targets per room.
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    /// Reverse index: rooms each connection is subscribed to.
    subscriptions: HashMap<ConnectionId, HashSet<RoomId>>,
}

/// Tracks which connections are delivery targets for which rooms.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    /// Atomic counter tracking live connections (avoids read-locking for count queries).
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly connected handle.
    pub async fn add(&self, handle: Arc<ConnectionHandle>) {
        let mut state = self.state.write().await;
        if state.handles.insert(handle.id, handle).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection and release every subscription it held.
    ///
    /// Called exactly once per connection lifecycle end; returns the handle
    /// if the connection was known.
    pub async fn remove(&self, conn: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let mut state = self.state.write().await;
        Self::release_subscriptions(&mut state, conn);
        let handle = state.handles.remove(&conn);
        if handle.is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        handle
    }

    /// Register `conn` as a delivery target for `room`.
    ///
    /// Idempotent; the room need not exist in the directory. Unknown
    /// connections are ignored — the caller raced a disconnect.
    pub async fn subscribe(&self, conn: ConnectionId, room: RoomId) {
        let mut state = self.state.write().await;
        if !state.handles.contains_key(&conn) {
            debug!(%conn, %room, "subscribe after disconnect, ignoring");
            return;
        }
        let _ = state.rooms.entry(room).or_default().insert(conn);
        let _ = state.subscriptions.entry(conn).or_default().insert(room);
    }

    /// Remove one routing entry. No-op if absent.
    pub async fn unsubscribe(&self, conn: ConnectionId, room: RoomId) {
        let mut state = self.state.write().await;
        if let Some(conns) = state.rooms.get_mut(&room) {
            let _ = conns.remove(&conn);
            if conns.is_empty() {
                let _ = state.rooms.remove(&room);
            }
        }
        if let Some(rooms) = state.subscriptions.get_mut(&conn) {
            let _ = rooms.remove(&room);
            if rooms.is_empty() {
                let _ = state.subscriptions.remove(&conn);
            }
        }
    }

    /// Release every subscription held by `conn`, keeping the handle live.
    pub async fn unsubscribe_all(&self, conn: ConnectionId) {
        let mut state = self.state.write().await;
        Self::release_subscriptions(&mut state, conn);
    }

    /// Drop all routing entries for a room (after the room is deleted).
    ///
    /// `resolve` returns an empty set for the room from this point on.
    pub async fn purge_room(&self, room: RoomId) {
        let mut state = self.state.write().await;
        if let Some(conns) = state.rooms.remove(&room) {
            for conn in conns {
                if let Some(rooms) = state.subscriptions.get_mut(&conn) {
                    let _ = rooms.remove(&room);
                    if rooms.is_empty() {
                        let _ = state.subscriptions.remove(&conn);
                    }
                }
            }
        }
    }

    /// Snapshot of the live delivery targets for a room. No ordering guarantee.
    pub async fn resolve(&self, room: RoomId) -> Vec<Arc<ConnectionHandle>> {
        let state = self.state.read().await;
        state
            .rooms
            .get(&room)
            .map(|conns| {
                conns
                    .iter()
                    .filter_map(|id| state.handles.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up one live handle.
    pub async fn get(&self, conn: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.state.read().await.handles.get(&conn).cloned()
    }

    /// All live connections belonging to `user`.
    pub async fn connections_of(&self, user: UserId) -> Vec<Arc<ConnectionHandle>> {
        let state = self.state.read().await;
        state
            .handles
            .values()
            .filter(|h| h.user == user)
            .cloned()
            .collect()
    }

    /// Whether `conn` currently routes for `room`.
    pub async fn is_subscribed(&self, conn: ConnectionId, room: RoomId) -> bool {
        let state = self.state.read().await;
        state
            .subscriptions
            .get(&conn)
            .is_some_and(|rooms| rooms.contains(&room))
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    fn release_subscriptions(state: &mut RegistryState, conn: ConnectionId) {
        if let Some(rooms) = state.subscriptions.remove(&conn) {
            for room in rooms {
                if let Some(conns) = state.rooms.get_mut(&room) {
                    let _ = conns.remove(&conn);
                    if conns.is_empty() {
                        let _ = state.rooms.remove(&room);
                    }
                }
            }
        }
    }
}
