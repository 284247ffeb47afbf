use clap::Parser;
use shared::{DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_PORT};
use std::time::Duration;

/// Command line configuration for the lobby server
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(author, version, about)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Snapshot broadcast interval in milliseconds
    #[clap(short, long, default_value_t = DEFAULT_BROADCAST_INTERVAL_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick_ms: DEFAULT_BROADCAST_INTERVAL_MS,
        }
    }
}
