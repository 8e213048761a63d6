//! Session struct definition
//!
//! Represents a registered client and the outbound channel to its writer.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::types::{ClientId, ConnId};

/// Outbound queue depth per session
pub const OUTBOUND_BUFFER_SIZE: usize = 64;

/// Registered client
///
/// The connection's read half stays with its handler task; this struct
/// holds only the sending side of the queue drained by the writer task,
/// so any task may deliver to it.
#[derive(Debug)]
pub struct Session {
    /// Identifier chosen by the client
    pub id: ClientId,
    /// Connection this session was registered on
    pub conn: ConnId,
    /// Remote address, for logging
    pub peer_addr: SocketAddr,
    /// Server → Client frame channel
    sender: mpsc::Sender<String>,
}

impl Session {
    /// Create a new session with the given identity and sender channel
    pub fn new(
        id: ClientId,
        conn: ConnId,
        peer_addr: SocketAddr,
        sender: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id,
            conn,
            peer_addr,
            sender,
        }
    }

    /// Queue one frame of text for this session
    ///
    /// Never waits: a session whose queue is full loses the frame.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.sender.try_send(text.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_session_send() {
        let (tx, mut rx) = mpsc::channel(4);
        let session = Session::new(ClientId::parse("alice").unwrap(), ConnId::new(), addr(), tx);

        session.send("hello").unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_session_send_full_queue() {
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::new(ClientId::parse("alice").unwrap(), ConnId::new(), addr(), tx);

        session.send("one").unwrap();
        assert!(matches!(session.send("two"), Err(SendError::QueueFull)));
    }

    #[tokio::test]
    async fn test_session_send_closed() {
        let (tx, rx) = mpsc::channel(1);
        let session = Session::new(ClientId::parse("alice").unwrap(), ConnId::new(), addr(), tx);
        drop(rx);

        assert!(matches!(session.send("lost"), Err(SendError::ChannelClosed)));
    }
}
