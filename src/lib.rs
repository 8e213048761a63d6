//! Multi-client TCP Chat Server Library
//!
//! Clients connect over TCP, register a unique identifier and exchange
//! messages either with everyone in the public room or with one other
//! client.
//!
//! # Wire protocol
//! - Every message is one fixed-size, NUL-padded frame (300 bytes by default)
//! - The first frame from a client is a 21-byte registration frame holding
//!   its identifier
//! - Commands: `send "<RECIPIENT>" "<MESSAGE>"`, where `room` addresses everyone
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the session registry
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed - all registry access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//! use room_chat::{serve, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(config.bind_addr()).await.unwrap();
//!     serve(listener, config, CancellationToken::new()).await;
//! }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod frame;
pub mod handler;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use command::{parse, Command};
pub use config::ServerConfig;
pub use error::{AppError, ParseError, RegisterError, SendError};
pub use frame::FrameCodec;
pub use handler::handle_connection;
pub use registry::Registry;
pub use router::{route, Delivery};
pub use server::{serve, ChatServer, ServerCommand};
pub use session::Session;
pub use types::{ClientId, ConnId, ROOM};
