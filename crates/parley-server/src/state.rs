//! Shared application state.

use std::sync::Arc;

use parley_core::profile::{ProfileProvider, StaticProfiles};
use parley_rooms::{BroadcastEngine, ConnectionRegistry, RoomCoordinator, RoomDirectory};

use crate::config::ServerConfig;

/// Everything a request handler needs, cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
    /// Membership coordinator; the single entry point for room operations.
    pub coordinator: Arc<RoomCoordinator>,
    /// Broadcast engine, for direct acknowledgments and error frames.
    pub engine: BroadcastEngine,
    /// Identity collaborator (in-memory for the demo server).
    pub profiles: Arc<StaticProfiles>,
}

impl AppState {
    /// Wire up the engine components.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let directory = Arc::new(RoomDirectory::new());
        let engine = BroadcastEngine::new(Arc::clone(&registry));
        let profiles = Arc::new(StaticProfiles::new());
        let coordinator = Arc::new(RoomCoordinator::new(
            directory,
            registry,
            engine.clone(),
            Arc::clone(&profiles) as Arc<dyn ProfileProvider>,
        ));
        Self {
            config: Arc::new(config),
            coordinator,
            engine,
            profiles,
        }
    }
}
