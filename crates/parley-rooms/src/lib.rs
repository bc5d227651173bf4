//! # parley-rooms
//!
//! The room membership and broadcast core of Parley.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-connection delivery handle over a bounded FIFO channel |
//! | `registry` | Connection Registry: connection ↔ room routing entries |
//! | `directory` | Room Directory: room entities, ownership, membership |
//! | `broadcast` | Broadcast Engine: fan-out to room / all-but-sender / single target |
//! | `coordinator` | Membership Coordinator: compound join/leave/update/delete flows |
//!
//! ## Data Flow
//!
//! An external request enters the [`coordinator::RoomCoordinator`], which
//! validates against the [`directory::RoomDirectory`], mutates it, then asks
//! the [`broadcast::BroadcastEngine`] to notify affected connections, which
//! resolves live targets through the [`registry::ConnectionRegistry`].
//!
//! Operations on different rooms run concurrently; operations on one room
//! are linearized by a per-room lock held only across in-memory mutation and
//! broadcast enqueue, never across I/O.

#![deny(unsafe_code)]

pub mod broadcast;
pub mod connection;
pub mod coordinator;
pub mod directory;
pub mod registry;

pub use broadcast::BroadcastEngine;
pub use connection::{ConnectionHandle, DEFAULT_OUTBOUND_BUFFER};
pub use coordinator::RoomCoordinator;
pub use directory::{MemberAdded, RoomDirectory, RoomPatch, RoomSpec};
pub use registry::ConnectionRegistry;
