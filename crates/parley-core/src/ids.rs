//! Branded identifier newtypes.
//!
//! Rooms, users, and transport connections all have UUID identities, but they
//! are never interchangeable: a `RoomId` cannot be passed where a `UserId` is
//! expected. Each newtype is `Copy`, serde-transparent, and printable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error parsing an identifier from its string form.
#[derive(Debug, thiserror::Error)]
#[error("invalid identifier '{input}': {source}")]
pub struct ParseIdError {
    /// The rejected input.
    pub input: String,
    /// Underlying UUID parse failure.
    #[source]
    pub source: uuid::Error,
}

/// Declarative macro that generates one branded ID newtype.
///
/// Adding a new identity kind requires ONE invocation; the compiler keeps
/// the kinds apart everywhere else.
macro_rules! branded_id {
    ($(#[doc = $doc:literal])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh time-ordered (v7) identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The raw UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|source| ParseIdError {
                    input: s.to_string(),
                    source,
                })
            }
        }
    };
}

branded_id! {
    /// Identity of a room.
    RoomId
}

branded_id! {
    /// Identity of a user account.
    UserId
}

branded_id! {
    /// Identity of one live transport connection (ephemeral).
    ConnectionId
}
