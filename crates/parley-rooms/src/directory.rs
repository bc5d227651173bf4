//! Room Directory: room entities, ownership, and membership.
//!
//! The directory is the sole owner of every room's member set. Membership
//! changes go through [`RoomDirectory::add_member`] and
//! [`RoomDirectory::remove_member`] only; metadata patches cannot touch
//! members. Key rules:
//!
//! - **Owner immutability**: the owner is fixed at creation and never part
//!   of a patch.
//! - **Duplicate-free members**: the member set is a `HashSet`, so a user
//!   identity appears at most once by construction.
//! - **Owner-gated mutation**: update and delete fail with `Forbidden` for
//!   anyone but the owner, leaving room state unchanged.
//! - **Cascade**: deleting a user account removes every room they own.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use parley_core::errors::RoomsError;
use parley_core::events::RoomState;
use parley_core::ids::{RoomId, UserId};

/// Upper bound on a room's display name.
pub const MAX_ROOM_NAME_LEN: usize = 64;

/// Parameters for creating a room.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSpec {
    /// Display name; non-empty, at most [`MAX_ROOM_NAME_LEN`] characters.
    pub name: String,
    /// Whether the room is joinable/readable without an invitation.
    pub is_public: bool,
}

/// Owner-applied metadata patch. Members are NOT patchable.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPatch {
    /// New display name, if changing.
    pub name: Option<String>,
    /// New visibility, if changing.
    pub is_public: Option<bool>,
}

/// Outcome of [`RoomDirectory::add_member`]: the caller must distinguish
/// "newly joined" (broadcast required) from "already a member" (no
/// broadcast).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberAdded {
    /// The user was added; notify the room.
    Joined(RoomState),
    /// The user was already a member; join is a membership no-op.
    AlreadyMember(RoomState),
}

impl MemberAdded {
    /// The room snapshot, whichever way the add went.
    #[must_use]
    pub fn state(&self) -> &RoomState {
        match self {
            Self::Joined(state) | Self::AlreadyMember(state) => state,
        }
    }
}

struct Room {
    id: RoomId,
    owner: UserId,
    name: String,
    is_public: bool,
    members: HashSet<UserId>,
}

impl Room {
    fn state(&self) -> RoomState {
        RoomState {
            id: self.id,
            owner: self.owner,
            name: self.name.clone(),
            is_public: self.is_public,
            members: self.members.iter().copied().collect(),
        }
    }

    fn require_owner(&self, caller: UserId) -> Result<(), RoomsError> {
        if self.owner == caller {
            Ok(())
        } else {
            Err(RoomsError::Forbidden {
                room: self.id,
                user: caller,
            })
        }
    }
}

fn validate_name(name: &str) -> Result<String, RoomsError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RoomsError::Validation("room name must not be empty".into()));
    }
    if name.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(RoomsError::Validation(format!(
            "room name exceeds {MAX_ROOM_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Owns all room entities. Storage here is an in-memory map; every access
/// goes through the operation contract, so a durable store can replace the
/// map without changing callers.
#[derive(Default)]
pub struct RoomDirectory {
    rooms: RwLock<HashMap<RoomId, Room>>,
}

impl RoomDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new room owned by `owner` with an empty member set.
    ///
    /// The owner is not implicitly a member.
    pub async fn create(&self, owner: UserId, spec: RoomSpec) -> Result<RoomState, RoomsError> {
        let name = validate_name(&spec.name)?;
        let room = Room {
            id: RoomId::new(),
            owner,
            name,
            is_public: spec.is_public,
            members: HashSet::new(),
        };
        let state = room.state();
        let _ = self.rooms.write().await.insert(room.id, room);
        Ok(state)
    }

    /// Snapshot a room.
    pub async fn get(&self, room: RoomId) -> Result<RoomState, RoomsError> {
        self.rooms
            .read()
            .await
            .get(&room)
            .map(Room::state)
            .ok_or(RoomsError::RoomNotFound(room))
    }

    /// Apply an owner-gated metadata patch.
    pub async fn update(
        &self,
        room: RoomId,
        caller: UserId,
        patch: RoomPatch,
    ) -> Result<RoomState, RoomsError> {
        // Validate before touching the entity so a failed patch leaves the
        // room unchanged.
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&room).ok_or(RoomsError::RoomNotFound(room))?;
        entry.require_owner(caller)?;
        if let Some(name) = name {
            entry.name = name;
        }
        if let Some(is_public) = patch.is_public {
            entry.is_public = is_public;
        }
        Ok(entry.state())
    }

    /// Remove a room. Owner-gated.
    ///
    /// The caller is responsible for notifying subscribers BEFORE invoking
    /// this, so late messages to the room fail cleanly instead of silently.
    pub async fn delete(&self, room: RoomId, caller: UserId) -> Result<(), RoomsError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get(&room).ok_or(RoomsError::RoomNotFound(room))?;
        entry.require_owner(caller)?;
        let _ = rooms.remove(&room);
        Ok(())
    }

    /// Cascading delete of every room owned by `user`. Returns the removed
    /// room ids so the caller can notify each.
    pub async fn delete_all_owned_by(&self, user: UserId) -> Vec<RoomId> {
        let mut rooms = self.rooms.write().await;
        let owned: Vec<RoomId> = rooms
            .values()
            .filter(|r| r.owner == user)
            .map(|r| r.id)
            .collect();
        for id in &owned {
            let _ = rooms.remove(id);
        }
        owned
    }

    /// Add `user` to a room's member set.
    pub async fn add_member(&self, room: RoomId, user: UserId) -> Result<MemberAdded, RoomsError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&room).ok_or(RoomsError::RoomNotFound(room))?;
        if entry.members.insert(user) {
            Ok(MemberAdded::Joined(entry.state()))
        } else {
            Ok(MemberAdded::AlreadyMember(entry.state()))
        }
    }

    /// Remove `user` from a room's member set. No-op if not a member.
    pub async fn remove_member(
        &self,
        room: RoomId,
        user: UserId,
    ) -> Result<RoomState, RoomsError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&room).ok_or(RoomsError::RoomNotFound(room))?;
        let _ = entry.members.remove(&user);
        Ok(entry.state())
    }

    /// Every room whose members currently include `user`.
    pub async fn rooms_of(&self, user: UserId) -> Vec<RoomId> {
        self.rooms
            .read()
            .await
            .values()
            .filter(|r| r.members.contains(&user))
            .map(|r| r.id)
            .collect()
    }

    /// Listing projection of all public rooms.
    pub async fn public_rooms(&self) -> Vec<RoomState> {
        self.rooms
            .read()
            .await
            .values()
            .filter(|r| r.is_public)
            .map(Room::state)
            .collect()
    }

    /// All rooms owned by `user`.
    pub async fn rooms_owned_by(&self, user: UserId) -> Vec<RoomState> {
        self.rooms
            .read()
            .await
            .values()
            .filter(|r| r.owner == user)
            .map(Room::state)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn spec(name: &str, is_public: bool) -> RoomSpec {
        RoomSpec {
            name: name.into(),
            is_public,
        }
    }

    #[tokio::test]
    async fn create_starts_with_no_members() {
        let directory = RoomDirectory::new();
        let owner = UserId::new();
        let state = directory.create(owner, spec("general", true)).await.unwrap();
        assert_eq!(state.owner, owner);
        assert!(state.members.is_empty());
        assert!(state.is_public);
        // The owner is not implicitly a member.
        assert!(!state.has_member(owner));
    }

    #[tokio::test]
    async fn create_rejects_blank_and_oversized_names() {
        let directory = RoomDirectory::new();
        let owner = UserId::new();
        assert_matches!(
            directory.create(owner, spec("   ", true)).await,
            Err(RoomsError::Validation(_))
        );
        let long = "x".repeat(MAX_ROOM_NAME_LEN + 1);
        assert_matches!(
            directory.create(owner, spec(&long, true)).await,
            Err(RoomsError::Validation(_))
        );
    }

    #[tokio::test]
    async fn create_trims_name() {
        let directory = RoomDirectory::new();
        let state = directory
            .create(UserId::new(), spec("  general  ", false))
            .await
            .unwrap();
        assert_eq!(state.name, "general");
    }

    #[tokio::test]
    async fn get_unknown_room_is_not_found() {
        let directory = RoomDirectory::new();
        let room = RoomId::new();
        assert_matches!(
            directory.get(room).await,
            Err(RoomsError::RoomNotFound(r)) if r == room
        );
    }

    #[tokio::test]
    async fn add_member_distinguishes_first_join_from_rejoin() {
        let directory = RoomDirectory::new();
        let state = directory
            .create(UserId::new(), spec("general", true))
            .await
            .unwrap();
        let user = UserId::new();
        assert_matches!(
            directory.add_member(state.id, user).await.unwrap(),
            MemberAdded::Joined(_)
        );
        let again = directory.add_member(state.id, user).await.unwrap();
        assert_matches!(again, MemberAdded::AlreadyMember(_));
        // No duplicate entry either way.
        assert_eq!(again.state().members, vec![user]);
    }

    #[tokio::test]
    async fn remove_member_is_noop_when_absent() {
        let directory = RoomDirectory::new();
        let state = directory
            .create(UserId::new(), spec("general", true))
            .await
            .unwrap();
        let after = directory
            .remove_member(state.id, UserId::new())
            .await
            .unwrap();
        assert!(after.members.is_empty());
    }

    #[tokio::test]
    async fn update_is_owner_gated_and_leaves_state_unchanged_on_failure() {
        let directory = RoomDirectory::new();
        let owner = UserId::new();
        let state = directory.create(owner, spec("before", false)).await.unwrap();
        let intruder = UserId::new();
        let err = directory
            .update(
                state.id,
                intruder,
                RoomPatch {
                    name: Some("after".into()),
                    is_public: Some(true),
                },
            )
            .await
            .unwrap_err();
        assert_matches!(err, RoomsError::Forbidden { user, .. } if user == intruder);
        let unchanged = directory.get(state.id).await.unwrap();
        assert_eq!(unchanged.name, "before");
        assert!(!unchanged.is_public);
    }

    #[tokio::test]
    async fn update_applies_partial_patch() {
        let directory = RoomDirectory::new();
        let owner = UserId::new();
        let state = directory.create(owner, spec("before", false)).await.unwrap();
        let updated = directory
            .update(
                state.id,
                owner,
                RoomPatch {
                    name: Some("after".into()),
                    is_public: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "after");
        assert!(!updated.is_public);
        assert_eq!(updated.owner, owner);
    }

    #[tokio::test]
    async fn update_rejects_invalid_patch_without_mutating() {
        let directory = RoomDirectory::new();
        let owner = UserId::new();
        let state = directory.create(owner, spec("before", false)).await.unwrap();
        let err = directory
            .update(
                state.id,
                owner,
                RoomPatch {
                    name: Some(String::new()),
                    is_public: Some(true),
                },
            )
            .await
            .unwrap_err();
        assert_matches!(err, RoomsError::Validation(_));
        let unchanged = directory.get(state.id).await.unwrap();
        assert_eq!(unchanged.name, "before");
        assert!(!unchanged.is_public);
    }

    #[tokio::test]
    async fn delete_is_owner_gated() {
        let directory = RoomDirectory::new();
        let owner = UserId::new();
        let state = directory.create(owner, spec("general", true)).await.unwrap();
        assert_matches!(
            directory.delete(state.id, UserId::new()).await,
            Err(RoomsError::Forbidden { .. })
        );
        assert!(directory.get(state.id).await.is_ok());
        directory.delete(state.id, owner).await.unwrap();
        assert_matches!(
            directory.get(state.id).await,
            Err(RoomsError::RoomNotFound(_))
        );
    }

    #[tokio::test]
    async fn cascade_removes_only_owned_rooms() {
        let directory = RoomDirectory::new();
        let doomed = UserId::new();
        let other = UserId::new();
        let a = directory.create(doomed, spec("a", true)).await.unwrap();
        let b = directory.create(doomed, spec("b", false)).await.unwrap();
        let keep = directory.create(other, spec("keep", true)).await.unwrap();
        let mut removed = directory.delete_all_owned_by(doomed).await;
        removed.sort_unstable();
        let mut expected = vec![a.id, b.id];
        expected.sort_unstable();
        assert_eq!(removed, expected);
        assert!(directory.get(keep.id).await.is_ok());
    }

    #[tokio::test]
    async fn rooms_of_tracks_membership_not_ownership() {
        let directory = RoomDirectory::new();
        let owner = UserId::new();
        let member = UserId::new();
        let a = directory.create(owner, spec("a", true)).await.unwrap();
        let _b = directory.create(owner, spec("b", true)).await.unwrap();
        let _ = directory.add_member(a.id, member).await.unwrap();
        assert_eq!(directory.rooms_of(member).await, vec![a.id]);
        assert!(directory.rooms_of(owner).await.is_empty());
    }

    #[tokio::test]
    async fn listing_projections() {
        let directory = RoomDirectory::new();
        let owner = UserId::new();
        let _pub = directory.create(owner, spec("open", true)).await.unwrap();
        let _priv = directory.create(owner, spec("closed", false)).await.unwrap();
        let public = directory.public_rooms().await;
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].name, "open");
        assert_eq!(directory.rooms_owned_by(owner).await.len(), 2);
        assert!(directory.rooms_owned_by(UserId::new()).await.is_empty());
    }
}
