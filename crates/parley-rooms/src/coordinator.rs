//! Membership Coordinator: compound join/leave/update/delete flows.
//!
//! Each operation is validate → mutate directory → notify via broadcast →
//! update registry, made observably atomic per room by a per-room lock.
//! Different rooms proceed concurrently; there is no global lock.
//!
//! Lock discipline: profile resolution is the only I/O-bound step and runs
//! BEFORE the room lock is taken. Under the lock the coordinator only
//! mutates in-memory state and enqueues broadcasts (non-blocking
//! `try_send`), so broadcast issue order per room equals mutation order —
//! the ordering property clients depend on — without broadcast backpressure
//! ever stalling an unrelated join.
//!
//! Failure semantics: a committed directory mutation is never rolled back
//! by a later delivery drop; errors propagate to the caller and are never
//! retried here.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, instrument, warn};

use parley_core::errors::RoomsError;
use parley_core::events::{RoomEvent, RoomState};
use parley_core::ids::{ConnectionId, RoomId, UserId};
use parley_core::profile::ProfileProvider;

use crate::broadcast::BroadcastEngine;
use crate::connection::ConnectionHandle;
use crate::directory::{MemberAdded, RoomDirectory, RoomPatch, RoomSpec};
use crate::registry::ConnectionRegistry;

/// Upper bound on a chat message body.
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Orchestrates membership changes and their notifications.
pub struct RoomCoordinator {
    directory: Arc<RoomDirectory>,
    registry: Arc<ConnectionRegistry>,
    engine: BroadcastEngine,
    profiles: Arc<dyn ProfileProvider>,
    /// One lock per room id; entries are dropped when the room is deleted.
    room_locks: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl RoomCoordinator {
    /// Wire a coordinator over its collaborators.
    #[must_use]
    pub fn new(
        directory: Arc<RoomDirectory>,
        registry: Arc<ConnectionRegistry>,
        engine: BroadcastEngine,
        profiles: Arc<dyn ProfileProvider>,
    ) -> Self {
        Self {
            directory,
            registry,
            engine,
            profiles,
            room_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, room: RoomId) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(room)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock-table entry for a room that turned out not to exist,
    /// so repeated operations against unknown ids cannot grow the table.
    /// Safe while other tasks hold clones of the Arc: they fail the same
    /// existence check and release theirs too.
    fn release_lock(&self, room: RoomId) {
        let _ = self.room_locks.remove(&room);
    }

    /// Register a new transport connection for `user`.
    ///
    /// Returns the handle and the receiving half the transport's write loop
    /// must drain.
    pub async fn connect(
        &self,
        user: UserId,
        buffer: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<Arc<String>>) {
        let (handle, rx) = ConnectionHandle::channel(ConnectionId::new(), user, buffer);
        self.registry.add(Arc::clone(&handle)).await;
        debug!(conn = %handle.id, %user, "connection registered");
        (handle, rx)
    }

    /// Tear down a connection: implicit leave-all if this was the user's
    /// last live connection, then release every routing entry.
    ///
    /// Self-triggered on transport close; always runs to completion.
    #[instrument(skip(self), fields(op = "room.disconnect"))]
    pub async fn disconnect(&self, conn: ConnectionId) {
        let Some(handle) = self.registry.remove(conn).await else {
            return;
        };
        // A user with another tab open stays a member until the last
        // connection goes.
        if self.registry.connections_of(handle.user).await.is_empty() {
            self.leave_all(handle.user).await;
        }
    }

    /// Create a room. No broadcast — a fresh room has no subscribers.
    #[instrument(skip(self, spec), fields(op = "room.create"))]
    pub async fn create_room(
        &self,
        owner: UserId,
        spec: RoomSpec,
    ) -> Result<RoomState, RoomsError> {
        self.directory.create(owner, spec).await
    }

    /// Join `user` to `room`, subscribing `conn` for delivery.
    ///
    /// Already a member: the subscription is re-established (reconnect
    /// path) and the current state returned, with NO broadcast. Newly
    /// joined: every subscriber — the joiner's own connection included —
    /// receives `room:join` with the user's public profile.
    #[instrument(skip(self), fields(op = "room.join"))]
    pub async fn join(
        &self,
        user: UserId,
        room: RoomId,
        conn: ConnectionId,
    ) -> Result<RoomState, RoomsError> {
        // I/O before the lock.
        let profile = self.profiles.public_profile(user).await?;
        // Fail fast on unknown rooms without touching the lock table.
        let _ = self.directory.get(room).await?;

        let lock = self.lock_for(room);
        let guard = lock.lock().await;
        match self.directory.add_member(room, user).await {
            Ok(MemberAdded::AlreadyMember(state)) => {
                self.registry.subscribe(conn, room).await;
                Ok(state)
            }
            Ok(MemberAdded::Joined(state)) => {
                self.registry.subscribe(conn, room).await;
                self.engine
                    .broadcast_to_room(
                        room,
                        &RoomEvent::Joined {
                            room_id: room,
                            user: profile,
                        },
                    )
                    .await;
                Ok(state)
            }
            Err(e) => {
                // Lost a race with delete_room; release the entry it left.
                drop(guard);
                self.release_lock(room);
                Err(e)
            }
        }
    }

    /// Remove `user` from every room they belong to, notifying each.
    ///
    /// The user's own connections are unsubscribed before the `room:leave`
    /// broadcast, so only the remaining subscribers observe it. Runs to
    /// completion even when the identity collaborator no longer knows the
    /// user (account already removed): memberships are still released, only
    /// the `room:leave` notifications are skipped.
    #[instrument(skip(self), fields(op = "room.leave_all"))]
    pub async fn leave_all(&self, user: UserId) {
        let profile = self.profiles.public_profile(user).await.ok();
        if profile.is_none() {
            warn!(%user, "leave-all without a profile, skipping notifications");
        }
        let rooms = self.directory.rooms_of(user).await;
        for room in rooms {
            let lock = self.lock_for(room);
            let guard = lock.lock().await;
            // The room may have been deleted since the snapshot.
            if self.directory.remove_member(room, user).await.is_err() {
                drop(guard);
                self.release_lock(room);
                continue;
            }
            for handle in self.registry.connections_of(user).await {
                self.registry.unsubscribe(handle.id, room).await;
            }
            if let Some(profile) = &profile {
                self.engine
                    .broadcast_to_room(
                        room,
                        &RoomEvent::Left {
                            room_id: room,
                            user: profile.clone(),
                        },
                    )
                    .await;
            }
        }
    }

    /// Owner-gated metadata update, broadcast to all current subscribers.
    #[instrument(skip(self, patch), fields(op = "room.update"))]
    pub async fn update_room(
        &self,
        room: RoomId,
        caller: UserId,
        patch: RoomPatch,
    ) -> Result<RoomState, RoomsError> {
        // Fail fast on unknown rooms without touching the lock table.
        let _ = self.directory.get(room).await?;
        let lock = self.lock_for(room);
        let guard = lock.lock().await;
        let state = match self.directory.update(room, caller, patch).await {
            Ok(state) => state,
            Err(e) => {
                if matches!(e, RoomsError::RoomNotFound(_)) {
                    drop(guard);
                    self.release_lock(room);
                }
                return Err(e);
            }
        };
        self.engine
            .broadcast_to_room(
                room,
                &RoomEvent::Updated {
                    room: state.clone(),
                },
            )
            .await;
        Ok(state)
    }

    /// Owner-gated delete: notify current subscribers FIRST, then remove
    /// the room and purge its routing entries.
    #[instrument(skip(self), fields(op = "room.delete"))]
    pub async fn delete_room(&self, room: RoomId, caller: UserId) -> Result<(), RoomsError> {
        // Fail fast on unknown rooms without touching the lock table.
        let _ = self.directory.get(room).await?;
        let lock = self.lock_for(room);
        {
            let guard = lock.lock().await;
            let state = match self.directory.get(room).await {
                Ok(state) => state,
                Err(e) => {
                    drop(guard);
                    self.release_lock(room);
                    return Err(e);
                }
            };
            if state.owner != caller {
                return Err(RoomsError::Forbidden { room, user: caller });
            }
            self.engine
                .broadcast_to_room(room, &RoomEvent::Deleted { room_id: room })
                .await;
            self.directory.delete(room, caller).await?;
            self.registry.purge_room(room).await;
        }
        self.release_lock(room);
        Ok(())
    }

    /// Cascade for account removal: leave every room, then delete every
    /// room the user owned (each with its terminal notification).
    ///
    /// Runs whether or not the identity collaborator still knows the user —
    /// account deletion usually removes the profile first. After this
    /// returns, no room references the user.
    #[instrument(skip(self), fields(op = "room.delete_user"))]
    pub async fn delete_user(&self, user: UserId) -> Result<(), RoomsError> {
        self.leave_all(user).await;
        for state in self.directory.rooms_owned_by(user).await {
            self.delete_room(state.id, user).await?;
        }
        // Sweep anything the user created while the cascade ran.
        let stragglers = self.directory.delete_all_owned_by(user).await;
        for room in stragglers {
            self.registry.purge_room(room).await;
            self.release_lock(room);
        }
        Ok(())
    }

    /// Validate and fan a chat message out to every subscriber of `room`
    /// except the sender's own connection.
    #[instrument(skip(self, body), fields(op = "room.message"))]
    pub async fn send_message(
        &self,
        sender: UserId,
        sender_conn: ConnectionId,
        room: RoomId,
        body: String,
    ) -> Result<(), RoomsError> {
        if body.trim().is_empty() {
            return Err(RoomsError::Validation("message must not be empty".into()));
        }
        if body.chars().count() > MAX_MESSAGE_LEN {
            return Err(RoomsError::Validation(format!(
                "message exceeds {MAX_MESSAGE_LEN} characters"
            )));
        }
        let profile = self.profiles.public_profile(sender).await?;
        let state = self.directory.get(room).await?;
        if !state.is_public && !state.has_member(sender) {
            return Err(RoomsError::Forbidden { room, user: sender });
        }
        self.engine
            .broadcast_excluding(
                sender_conn,
                room,
                &RoomEvent::Message {
                    room_id: room,
                    sender: profile,
                    body,
                },
            )
            .await;
        Ok(())
    }
}
