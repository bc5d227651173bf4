//! Runtime configuration.

use std::net::{IpAddr, SocketAddr};

use clap::Parser;

use parley_rooms::DEFAULT_OUTBOUND_BUFFER;

/// Server configuration from CLI flags, with environment fallbacks.
#[derive(Parser, Clone, Debug)]
#[command(name = "parley-server", about = "Room-based realtime messaging server")]
pub struct ServerConfig {
    /// Address to bind.
    #[arg(long, env = "PARLEY_BIND", default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PARLEY_PORT", default_value_t = 4800)]
    pub port: u16,

    /// Outbound queue capacity per connection; a client falling this far
    /// behind starts dropping messages.
    #[arg(long, env = "PARLEY_OUTBOUND_BUFFER", default_value_t = DEFAULT_OUTBOUND_BUFFER)]
    pub outbound_buffer: usize,
}

impl ServerConfig {
    /// The socket address to listen on.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::parse_from(["parley-server"])
    }
}
