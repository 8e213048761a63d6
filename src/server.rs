//! ChatServer Actor implementation
//!
//! The central actor that owns the session registry. Handlers never touch
//! the registry directly; every registration, removal and routed message
//! goes through the actor's command channel and is processed in order.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::command::parse;
use crate::config::{ServerConfig, CHANNEL_BUFFER_SIZE};
use crate::error::{RegisterError, SendError};
use crate::handler::handle_connection;
use crate::registry::Registry;
use crate::router::{join_notice, route, Delivery};
use crate::session::Session;
use crate::types::{ClientId, ConnId};

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Admit a new session
    Register {
        session: Session,
        reply: oneshot::Sender<Result<(), RegisterError>>,
    },
    /// Text frame received from a registered session
    Message {
        sender: ClientId,
        conn: ConnId,
        text: String,
    },
    /// Connection of a registered session ended
    Unregister { id: ClientId, conn: ConnId },
    /// Report the number of live sessions
    Count { reply: oneshot::Sender<usize> },
}

/// The main ChatServer actor
pub struct ChatServer {
    /// Live sessions
    registry: Registry,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
    /// Process-wide shutdown signal
    shutdown: CancellationToken,
    /// Cancel `shutdown` when the last session leaves
    shutdown_when_empty: bool,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(
        receiver: mpsc::Receiver<ServerCommand>,
        max_clients: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry: Registry::new(max_clients),
            receiver,
            shutdown,
            shutdown_when_empty: true,
        }
    }

    /// Enable or disable stopping the server when the last client leaves
    pub fn shutdown_when_empty(mut self, enabled: bool) -> Self {
        self.shutdown_when_empty = enabled;
        self
    }

    /// Run the ChatServer event loop
    ///
    /// Processes commands until shutdown is signalled or all senders are
    /// dropped. Dropping the registry on exit closes every session's writer.
    pub async fn run(mut self) {
        info!(
            "ChatServer started (max {} clients)",
            self.registry.max_clients()
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }

        info!(
            "ChatServer shutting down, closing {} session(s)",
            self.registry.count()
        );
        self.registry.clear();
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Register { session, reply } => {
                self.handle_register(session, reply);
            }
            ServerCommand::Message { sender, conn, text } => {
                self.handle_message(sender, conn, text);
            }
            ServerCommand::Unregister { id, conn } => {
                self.handle_unregister(id, conn);
            }
            ServerCommand::Count { reply } => {
                let _ = reply.send(self.registry.count());
            }
        }
    }

    /// Handle a registration attempt
    fn handle_register(
        &mut self,
        session: Session,
        reply: oneshot::Sender<Result<(), RegisterError>>,
    ) {
        let id = session.id.clone();
        let peer_addr = session.peer_addr;

        let result = self.registry.try_register(session).map(|_| ());
        match result {
            Ok(()) => {
                info!("Connection from client with ID {} ({})", id, peer_addr);
                debug!(
                    "Total clients: {}/{}",
                    self.registry.count(),
                    self.registry.max_clients()
                );
                let notices = join_notice(&self.registry, &id);
                self.deliver(notices);
            }
            Err(e) => {
                info!("Rejected client {} from {}: {}", id, peer_addr, e);
            }
        }

        if reply.send(result).is_err() && result.is_ok() {
            // Handler went away before learning the outcome
            debug!("Handler for {} gone during registration", id);
            self.drop_session(&id);
        }
    }

    /// Handle a text frame from a registered session
    fn handle_message(&mut self, sender: ClientId, conn: ConnId, text: String) {
        if !self.owns(&sender, conn) {
            debug!("Ignoring message from {} on stale connection {}", sender, conn);
            return;
        }

        let command = parse(&sender, &text);
        info!("[COMMAND] from [CLIENT - ID: {}]: {}", command.sender(), text);

        let deliveries = route(&self.registry, &command);
        self.deliver(deliveries);
    }

    /// Handle the end of a registered connection
    fn handle_unregister(&mut self, id: ClientId, conn: ConnId) {
        if !self.owns(&id, conn) {
            debug!("Stale unregister for {} on {}", id, conn);
            return;
        }

        info!("Client with ID {} has disconnected", id);
        self.drop_session(&id);
    }

    /// Whether `id` is currently registered on connection `conn`
    fn owns(&self, id: &ClientId, conn: ConnId) -> bool {
        self.registry
            .lookup(id.as_str())
            .is_some_and(|session| session.conn == conn)
    }

    /// Remove a session and apply the shutdown-on-empty policy
    fn drop_session(&mut self, id: &ClientId) {
        if self.registry.remove(id.as_str()).is_none() {
            return;
        }
        debug!("Total clients: {}", self.registry.count());

        if self.registry.count() == 0 && self.shutdown_when_empty {
            info!("There are currently no clients connected. Shutting server down...");
            self.shutdown.cancel();
        }
    }

    /// Queue frames for their recipients
    ///
    /// A failed delivery affects only its recipient. A recipient whose
    /// writer is gone is torn down.
    fn deliver(&mut self, deliveries: Vec<Delivery>) {
        let mut closed = Vec::new();

        for Delivery { to, text } in deliveries {
            let Some(session) = self.registry.lookup(to.as_str()) else {
                debug!("Recipient {} vanished before delivery", to);
                continue;
            };
            match session.send(text) {
                Ok(()) => {}
                Err(SendError::QueueFull) => {
                    warn!("Outbound queue full for {}, frame dropped", to);
                }
                Err(SendError::ChannelClosed) => {
                    debug!("Writer for {} closed", to);
                    closed.push(to);
                }
            }
        }

        for id in closed {
            self.drop_session(&id);
        }
    }
}

/// Accept connections until shutdown, then wait for every connection to end
pub async fn serve(listener: TcpListener, config: ServerConfig, shutdown: CancellationToken) {
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let server = ChatServer::new(cmd_rx, config.max_clients, shutdown.clone())
        .shutdown_when_empty(config.shutdown_when_empty());

    let tracker = TaskTracker::new();
    tracker.spawn(server.run());
    info!("ChatServer actor started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("New TCP connection from {}", addr);
                    let cmd_tx = cmd_tx.clone();
                    let shutdown = shutdown.clone();
                    let frame_size = config.frame_size;

                    // Spawn handler task for each connection
                    tracker.spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, addr, cmd_tx, frame_size, shutdown).await
                        {
                            warn!("Connection {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
        }
    }

    drop(listener);
    drop(cmd_tx);
    info!("Listener closed, waiting for {} task(s)", tracker.len());

    tracker.close();
    tracker.wait().await;
    info!("Server stopped");
}

/// Address the server is reachable on, for logging
pub fn local_addr(listener: &TcpListener) -> Option<SocketAddr> {
    listener.local_addr().ok()
}
