//! # parley-core
//!
//! Foundation types for the Parley room messaging engine.
//!
//! This crate provides the shared vocabulary the other Parley crates depend on:
//!
//! - **Branded IDs**: [`ids::RoomId`], [`ids::UserId`], [`ids::ConnectionId`] as newtypes
//! - **Events**: [`events::RoomEvent`] for everything broadcast over the wire,
//!   [`events::RoomState`] as the room snapshot DTO
//! - **Errors**: [`errors::RoomsError`] hierarchy via `thiserror`
//! - **Profiles**: [`profile::PublicProfile`] and the [`profile::ProfileProvider`]
//!   seam to the identity collaborator
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `parley-rooms` and `parley-server`.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod profile;
