//! Connection handler
//!
//! Drives one accepted connection through its lifecycle:
//! registration handshake, the receive loop and teardown. Reads happen on
//! this task; writes go through a spawned writer task fed by the session's
//! outbound channel, so deliveries from other sessions never interleave.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AppError, RegisterError};
use crate::frame::FrameCodec;
use crate::server::ServerCommand;
use crate::session::{Session, OUTBOUND_BUFFER_SIZE};
use crate::types::{ClientId, ConnId};

/// Handle a new connection
///
/// Returns once the peer has closed, the transport failed, registration
/// was refused, or `shutdown` was cancelled.
pub async fn handle_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    cmd_tx: mpsc::Sender<ServerCommand>,
    frame_size: usize,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let conn = ConnId::new();
    debug!("Connection {} from {}", conn, peer_addr);

    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, FrameCodec::registration());
    let mut writer = FramedWrite::new(write_half, FrameCodec::new(frame_size));

    // Registration frame
    let raw_id = tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        frame = reader.next() => match frame {
            Some(frame) => frame?,
            None => {
                debug!("Connection {} closed before registering", conn);
                return Ok(());
            }
        },
    };

    let client_id = match ClientId::parse(&raw_id) {
        Ok(id) => id,
        Err(e) => return reject(&mut writer, conn, e).await,
    };

    // Create channel for server -> client frames
    let (msg_tx, msg_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER_SIZE);
    let session = Session::new(client_id.clone(), conn, peer_addr, msg_tx);

    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(ServerCommand::Register {
            session,
            reply: reply_tx,
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;

    match reply_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return reject(&mut writer, conn, e).await,
        Err(_) => return Err(AppError::ChannelSend),
    }
    debug!("Client {} active on connection {}", client_id, conn);

    reader.decoder_mut().set_frame_size(frame_size);

    // Cancelled by the writer on failure, or by process shutdown
    let conn_token = shutdown.child_token();
    let write_task = tokio::spawn(write_frames(writer, msg_rx, conn_token.clone()));

    loop {
        let text = tokio::select! {
            _ = conn_token.cancelled() => {
                debug!("Read loop for {} cancelled", client_id);
                break;
            }
            frame = reader.next() => match frame {
                Some(Ok(text)) => text,
                Some(Err(e)) => {
                    warn!("Read error for {}: {}", client_id, e);
                    break;
                }
                None => {
                    debug!("Client {} closed the connection", client_id);
                    break;
                }
            },
        };

        if text.is_empty() {
            continue;
        }

        let cmd = ServerCommand::Message {
            sender: client_id.clone(),
            conn,
            text,
        };
        if cmd_tx.send(cmd).await.is_err() {
            debug!("Server closed, ending read loop for {}", client_id);
            break;
        }
    }

    // Removing the session drops its sender, which ends the writer
    let _ = cmd_tx
        .send(ServerCommand::Unregister {
            id: client_id.clone(),
            conn,
        })
        .await;
    drop(reader);

    if let Err(e) = write_task.await {
        warn!("Writer task for {} failed: {}", client_id, e);
    }

    info!("Client {} disconnected", client_id);
    Ok(())
}

/// Tell a refused client why, then close its connection
async fn reject<W>(
    writer: &mut FramedWrite<W, FrameCodec>,
    conn: ConnId,
    err: RegisterError,
) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    debug!("Refusing connection {}: {}", conn, err);
    writer.send(err.to_string()).await?;
    writer.get_mut().shutdown().await?;
    Err(AppError::Register(err))
}

/// Drain the outbound channel into the connection
///
/// Gives up as soon as `conn_token` is cancelled, even mid-write to a peer
/// that stopped reading; dropping the writer then releases the handle.
async fn write_frames<W>(
    mut writer: FramedWrite<W, FrameCodec>,
    mut outbound: mpsc::Receiver<String>,
    conn_token: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let text = tokio::select! {
            _ = conn_token.cancelled() => return,
            text = outbound.recv() => match text {
                Some(text) => text,
                None => break,
            },
        };

        let sent = tokio::select! {
            _ = conn_token.cancelled() => {
                debug!("Write abandoned on shutdown");
                return;
            }
            sent = writer.send(text) => sent,
        };
        if let Err(e) = sent {
            warn!("Write failed: {}", e);
            conn_token.cancel();
            return;
        }
    }

    let _ = writer.get_mut().shutdown().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::BytesMut;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};
    use tokio::time::timeout;

    use super::*;
    use crate::config::CHANNEL_BUFFER_SIZE;
    use crate::frame::{decode_payload, encode_payload, REGISTRATION_FRAME_SIZE};
    use crate::server::ChatServer;

    const FRAME: usize = 64;
    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        cmd_tx: mpsc::Sender<ServerCommand>,
        shutdown: CancellationToken,
    }

    impl Harness {
        fn start(max_clients: usize) -> Self {
            Self::with_policy(max_clients, true)
        }

        fn with_policy(max_clients: usize, shutdown_when_empty: bool) -> Self {
            let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
            let shutdown = CancellationToken::new();
            let server = ChatServer::new(cmd_rx, max_clients, shutdown.clone())
                .shutdown_when_empty(shutdown_when_empty);
            tokio::spawn(server.run());
            Self { cmd_tx, shutdown }
        }

        fn open(&self) -> (DuplexStream, tokio::task::JoinHandle<Result<(), AppError>>) {
            self.open_with_buffer(4096)
        }

        fn open_with_buffer(
            &self,
            buffer: usize,
        ) -> (DuplexStream, tokio::task::JoinHandle<Result<(), AppError>>) {
            let (client, server) = duplex(buffer);
            let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
            let task = tokio::spawn(handle_connection(
                server,
                addr,
                self.cmd_tx.clone(),
                FRAME,
                self.shutdown.clone(),
            ));
            (client, task)
        }

        async fn connect(&self, id: &str) -> DuplexStream {
            let (mut client, _task) = self.open();
            write_frame(&mut client, id, REGISTRATION_FRAME_SIZE).await;
            client
        }

        async fn count(&self) -> usize {
            let (reply, count) = oneshot::channel();
            self.cmd_tx.send(ServerCommand::Count { reply }).await.unwrap();
            count.await.unwrap()
        }

        async fn wait_for_count(&self, expected: usize) {
            timeout(WAIT, async {
                while self.count().await != expected {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .unwrap();
        }
    }

    async fn write_frame(stream: &mut DuplexStream, text: &str, size: usize) {
        let mut buf = BytesMut::new();
        encode_payload(text, size, &mut buf);
        stream.write_all(&buf).await.unwrap();
    }

    /// Next frame, or `None` once the server closed the connection
    async fn read_frame(stream: &mut DuplexStream) -> Option<String> {
        let mut buf = vec![0u8; FRAME];
        match timeout(WAIT, stream.read_exact(&mut buf)).await.unwrap() {
            Ok(_) => Some(decode_payload(&buf)),
            Err(_) => None,
        }
    }

    #[tokio::test]
    async fn test_register_and_chat() {
        let harness = Harness::start(4);
        let mut alice = harness.connect("alice").await;
        harness.wait_for_count(1).await;
        let mut bob = harness.connect("bob").await;
        harness.wait_for_count(2).await;

        assert_eq!(read_frame(&mut alice).await.as_deref(), Some("bob has joined the Public Room!"));

        write_frame(&mut bob, r#"send "alice" "hi""#, FRAME).await;
        assert_eq!(read_frame(&mut alice).await.as_deref(), Some("bob-->[alice]: hi"));
        assert_eq!(read_frame(&mut bob).await.as_deref(), Some("bob-->[alice]: hi"));
    }

    #[tokio::test]
    async fn test_malformed_command_keeps_connection_open() {
        let harness = Harness::start(4);
        let mut alice = harness.connect("alice").await;
        harness.wait_for_count(1).await;

        write_frame(&mut alice, r#"send "B" hi""#, FRAME).await;
        assert_eq!(
            read_frame(&mut alice).await.as_deref(),
            Some(r#"Incorrect Syntax! Usage: send "<RECIPIENT>" "<MESSAGE>""#)
        );

        write_frame(&mut alice, r#"send "room" "still here""#, FRAME).await;
        assert_eq!(read_frame(&mut alice).await.as_deref(), Some("alice-->[room]: still here"));
    }

    #[tokio::test]
    async fn test_empty_frames_are_ignored() {
        let harness = Harness::start(4);
        let mut alice = harness.connect("alice").await;
        harness.wait_for_count(1).await;

        write_frame(&mut alice, "", FRAME).await;
        write_frame(&mut alice, r#"send "room" "x""#, FRAME).await;
        assert_eq!(read_frame(&mut alice).await.as_deref(), Some("alice-->[room]: x"));
    }

    #[tokio::test]
    async fn test_split_and_coalesced_writes() {
        let harness = Harness::start(4);
        let (mut alice, _task) = harness.open();

        let mut buf = BytesMut::new();
        encode_payload("alice", REGISTRATION_FRAME_SIZE, &mut buf);
        encode_payload(r#"send "room" "one""#, FRAME, &mut buf);
        encode_payload(r#"send "room" "two""#, FRAME, &mut buf);

        // Registration and first command in one write, the rest in pieces
        let split = REGISTRATION_FRAME_SIZE + FRAME + 10;
        alice.write_all(&buf[..split]).await.unwrap();
        alice.write_all(&buf[split..]).await.unwrap();

        assert_eq!(read_frame(&mut alice).await.as_deref(), Some("alice-->[room]: one"));
        assert_eq!(read_frame(&mut alice).await.as_deref(), Some("alice-->[room]: two"));
    }

    #[tokio::test]
    async fn test_duplicate_identifier_refused_and_closed() {
        let harness = Harness::start(4);
        let _alice = harness.connect("alice").await;
        harness.wait_for_count(1).await;

        let mut imposter = harness.connect("alice").await;
        assert_eq!(read_frame(&mut imposter).await.as_deref(), Some("This ID is already in use."));
        assert_eq!(read_frame(&mut imposter).await, None);
        assert_eq!(harness.count().await, 1);
    }

    #[tokio::test]
    async fn test_reserved_identifier_refused() {
        let harness = Harness::start(4);
        let mut room = harness.connect("room").await;
        assert_eq!(
            read_frame(&mut room).await.as_deref(),
            Some("The client's client ID cannot be \"room\"")
        );
        assert_eq!(read_frame(&mut room).await, None);
        assert_eq!(harness.count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_identifier_refused() {
        let harness = Harness::start(4);
        let mut nobody = harness.connect("").await;
        assert_eq!(
            read_frame(&mut nobody).await.as_deref(),
            Some(RegisterError::Invalid.to_string().as_str())
        );
        assert_eq!(read_frame(&mut nobody).await, None);
    }

    #[tokio::test]
    async fn test_full_registry_refused() {
        let harness = Harness::with_policy(1, false);
        let alice = harness.connect("alice").await;
        harness.wait_for_count(1).await;

        let mut bob = harness.connect("bob").await;
        assert_eq!(
            read_frame(&mut bob).await.as_deref(),
            Some("There isn't enough space on the server for a new client.")
        );

        // The freed slot admits exactly one newcomer
        drop(alice);
        harness.wait_for_count(0).await;
        let _carol = harness.connect("carol").await;
        harness.wait_for_count(1).await;
        let mut dave = harness.connect("dave").await;
        assert_eq!(
            read_frame(&mut dave).await.as_deref(),
            Some("There isn't enough space on the server for a new client.")
        );
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_registrations() {
        let harness = Harness::start(16);
        let mut clients = Vec::new();
        for _ in 0..8 {
            clients.push(harness.connect("same").await);
        }

        let mut refused = 0;
        for client in clients.iter_mut() {
            let mut buf = vec![0u8; FRAME];
            if let Ok(Ok(_)) = timeout(Duration::from_millis(300), client.read_exact(&mut buf)).await {
                assert_eq!(decode_payload(&buf), "This ID is already in use.");
                refused += 1;
            }
        }
        assert_eq!(refused, 7);
        assert_eq!(harness.count().await, 1);
    }

    #[tokio::test]
    async fn test_last_disconnect_signals_shutdown() {
        let harness = Harness::start(4);
        let alice = harness.connect("alice").await;
        harness.wait_for_count(1).await;

        drop(alice);
        timeout(WAIT, harness.shutdown.cancelled()).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_ends_handler() {
        let harness = Harness::start(4);
        let (mut alice, task) = harness.open();
        write_frame(&mut alice, "alice", REGISTRATION_FRAME_SIZE).await;
        harness.wait_for_count(1).await;

        harness.shutdown.cancel();
        timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        assert_eq!(read_frame(&mut alice).await, None);
    }

    #[tokio::test]
    async fn test_shutdown_ends_handler_when_client_stops_reading() {
        let harness = Harness::start(4);
        // Room for a single frame in each direction
        let (mut alice, task) = harness.open_with_buffer(FRAME);
        write_frame(&mut alice, "alice", REGISTRATION_FRAME_SIZE).await;
        harness.wait_for_count(1).await;

        // Echoes pile up on the server's writer; alice never reads them
        for _ in 0..20 {
            write_frame(&mut alice, r#"send "room" "x""#, FRAME).await;
        }
        harness.count().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        harness.shutdown.cancel();
        timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_before_registration() {
        let harness = Harness::start(4);
        let (alice, task) = harness.open();
        drop(alice);
        timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    }
}
