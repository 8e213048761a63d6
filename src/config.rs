//! Server configuration
//!
//! Parsed from the command line: `room_chat [port] [max_clients]`.

use clap::Parser;

use crate::frame::{DEFAULT_FRAME_SIZE, REGISTRATION_FRAME_SIZE};

/// Default listening port
pub const DEFAULT_PORT: u16 = 23;

/// Default registry capacity
pub const DEFAULT_MAX_CLIENTS: usize = 20;

/// Channel buffer size for server commands
pub const CHANNEL_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Parser)]
#[command(name = "room_chat", version, about = "Multi-client chat server with a public room")]
pub struct ServerConfig {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of clients connected at the same time
    #[arg(default_value_t = DEFAULT_MAX_CLIENTS, value_parser = parse_max_clients)]
    pub max_clients: usize,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Size in bytes of every message frame
    #[arg(long, default_value_t = DEFAULT_FRAME_SIZE, value_parser = parse_frame_size)]
    pub frame_size: usize,

    /// Keep serving after the last client disconnects
    #[arg(long)]
    pub keep_running: bool,
}

impl ServerConfig {
    /// Whether the server stops once the registry becomes empty
    pub fn shutdown_when_empty(&self) -> bool {
        !self.keep_running
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            host: "0.0.0.0".to_string(),
            frame_size: DEFAULT_FRAME_SIZE,
            keep_running: false,
        }
    }
}

fn parse_max_clients(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Message frames must at least fit a registration-sized identifier
pub fn parse_frame_size(raw: &str) -> Result<usize, String> {
    let size = raw.parse::<usize>().map_err(|e| e.to_string())?;
    if size <= REGISTRATION_FRAME_SIZE {
        return Err(format!("must be greater than {}", REGISTRATION_FRAME_SIZE));
    }
    Ok(size)
}
