//! Server entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley_server::config::ServerConfig;
use parley_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    let addr = config.socket_addr();
    let state = AppState::new(config);
    let app = parley_server::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "parley server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
