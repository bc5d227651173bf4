//! Public user profiles and the identity-collaborator seam.
//!
//! Credential storage, password checks, and token issuance live outside this
//! system. All it ever sees of a user is the [`PublicProfile`] projection —
//! the subset of fields safe to broadcast to other room members. Private
//! fields cannot leak into a broadcast payload because the projection type
//! simply does not carry them.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::RoomsError;
use crate::ids::UserId;

/// The broadcast-safe view of a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    /// User identity.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Avatar URL, if the user has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Resolves a user identity to its public projection.
///
/// Implemented by the external identity collaborator; lookups may be
/// I/O-bound, so callers must not hold room locks across them.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Look up the public profile for `user`.
    ///
    /// Returns [`RoomsError::UserNotFound`] for unknown identities.
    async fn public_profile(&self, user: UserId) -> Result<PublicProfile, RoomsError>;
}

/// In-memory `ProfileProvider` used by tests and the demo server.
#[derive(Default)]
pub struct StaticProfiles {
    profiles: RwLock<HashMap<UserId, PublicProfile>>,
}

impl StaticProfiles {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with the given display name, returning its identity.
    pub fn add(&self, name: impl Into<String>) -> UserId {
        let id = UserId::new();
        let profile = PublicProfile {
            id,
            name: name.into(),
            avatar: None,
        };
        let _ = self.profiles.write().insert(id, profile);
        id
    }

    /// Remove a user, e.g. when an account is deleted.
    pub fn remove(&self, user: UserId) {
        let _ = self.profiles.write().remove(&user);
    }
}

#[async_trait]
impl ProfileProvider for StaticProfiles {
    async fn public_profile(&self, user: UserId) -> Result<PublicProfile, RoomsError> {
        self.profiles
            .read()
            .get(&user)
            .cloned()
            .ok_or(RoomsError::UserNotFound(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn lookup_returns_registered_profile() {
        let profiles = StaticProfiles::new();
        let alice = profiles.add("alice");
        let p = profiles.public_profile(alice).await.unwrap();
        assert_eq!(p.id, alice);
        assert_eq!(p.name, "alice");
        assert_eq!(p.avatar, None);
    }

    #[tokio::test]
    async fn lookup_unknown_user_fails() {
        let profiles = StaticProfiles::new();
        let ghost = UserId::new();
        let err = profiles.public_profile(ghost).await.unwrap_err();
        assert_matches!(err, RoomsError::UserNotFound(u) if u == ghost);
    }

    #[tokio::test]
    async fn removed_user_is_unknown() {
        let profiles = StaticProfiles::new();
        let bob = profiles.add("bob");
        profiles.remove(bob);
        assert!(profiles.public_profile(bob).await.is_err());
    }

    #[test]
    fn profile_serializes_camel_case_without_empty_avatar() {
        let p = PublicProfile {
            id: UserId::new(),
            name: "alice".into(),
            avatar: None,
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["name"], "alice");
        assert!(json.get("avatar").is_none());
    }
}
