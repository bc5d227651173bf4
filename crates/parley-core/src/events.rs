//! Wire events broadcast to room subscribers.
//!
//! Every notification that leaves the broadcast engine is one [`RoomEvent`].
//! Events are transient — never persisted — and serialized exactly once per
//! broadcast, then shared across all target connections.
//!
//! Event names follow the `room:*` convention; clients rely on the exact
//! type strings and camelCase field names.

use serde::{Deserialize, Serialize};

use crate::ids::{RoomId, UserId};
use crate::profile::PublicProfile;

/// Snapshot of a room, as returned from reads and broadcast on update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    /// Room identity.
    pub id: RoomId,
    /// The owning user. Immutable after creation.
    pub owner: UserId,
    /// Display name.
    pub name: String,
    /// Whether the room is joinable/readable without an invitation.
    pub is_public: bool,
    /// Current member identities. Duplicate-free; order not meaningful.
    pub members: Vec<UserId>,
}

impl RoomState {
    /// Whether `user` is currently a member.
    #[must_use]
    pub fn has_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }
}

/// A room notification or message delivered to subscribed connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomEvent {
    /// A user joined the room. Sent to every subscriber, the joiner included.
    #[serde(rename = "room:join")]
    Joined {
        /// Room joined.
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// Public projection of the joining user.
        user: PublicProfile,
    },

    /// A user left the room (explicitly or by disconnect).
    #[serde(rename = "room:leave")]
    Left {
        /// Room left.
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// Public projection of the leaving user.
        user: PublicProfile,
    },

    /// Room metadata changed. Carries the full new state.
    #[serde(rename = "room:update")]
    Updated {
        /// New room snapshot.
        room: RoomState,
    },

    /// Terminal event: the room is being deleted. Sent BEFORE removal so
    /// subscribers observe the deletion rather than a silent void.
    #[serde(rename = "room:delete")]
    Deleted {
        /// Room being removed.
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },

    /// A chat message from one member to the rest of the room.
    #[serde(rename = "room:message")]
    Message {
        /// Target room.
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// Public projection of the sender.
        sender: PublicProfile,
        /// Message text.
        body: String,
    },

    /// An operation failed; delivered only to the connection that issued it.
    #[serde(rename = "room:error")]
    Error {
        /// Stable machine-readable code.
        code: String,
        /// Human-readable description.
        message: String,
    },
}

impl RoomEvent {
    /// The event type string (for type discrimination on the wire).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Joined { .. } => "room:join",
            Self::Left { .. } => "room:leave",
            Self::Updated { .. } => "room:update",
            Self::Deleted { .. } => "room:delete",
            Self::Message { .. } => "room:message",
            Self::Error { .. } => "room:error",
        }
    }
}
