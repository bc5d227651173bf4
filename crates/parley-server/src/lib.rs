//! # parley-server
//!
//! WebSocket transport for the Parley room engine.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | Runtime configuration from CLI flags and environment |
//! | `state` | Shared application state wiring the engine components |
//! | `ws` | WebSocket upgrade, per-connection read/write loops, command dispatch |
//!
//! ## Data Flow
//!
//! `ws` parses inbound frames into commands → coordinator → broadcast →
//! per-connection queues drained by each socket's write loop.

#![deny(unsafe_code)]

pub mod config;
pub mod state;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
