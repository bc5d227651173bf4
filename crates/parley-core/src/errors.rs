//! Error taxonomy for room operations.
//!
//! Every variant here is caller-facing and is never retried internally.
//! Delivery failures to individual connections are NOT part of this
//! taxonomy: a dead or slow connection silently drops one message and is
//! at most counted and logged.

use crate::ids::{RoomId, UserId};

/// Failures surfaced by room membership and broadcast operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RoomsError {
    /// The room does not exist (or no longer exists).
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// The user identity is unknown to the identity collaborator.
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// An owner-only mutation was attempted by a non-owner.
    #[error("user {user} is not the owner of room {room}")]
    Forbidden {
        /// Room being mutated.
        room: RoomId,
        /// The non-owner caller.
        user: UserId,
    },

    /// A malformed room spec or message payload.
    #[error("validation failed: {0}")]
    Validation(String),
}

impl RoomsError {
    /// Stable machine-readable code, for wire error frames.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) | Self::UserNotFound(_) => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Validation(_) => "validation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let room = RoomId::new();
        let user = UserId::new();
        assert_eq!(RoomsError::RoomNotFound(room).code(), "not_found");
        assert_eq!(RoomsError::UserNotFound(user).code(), "not_found");
        assert_eq!(RoomsError::Forbidden { room, user }.code(), "forbidden");
        assert_eq!(RoomsError::Validation("empty".into()).code(), "validation");
    }

    #[test]
    fn display_names_the_room() {
        let room = RoomId::new();
        let msg = RoomsError::RoomNotFound(room).to_string();
        assert!(msg.contains(&room.to_string()));
    }
}
