//! Chat Client - Entry Point
//!
//! Registers with the server, prints every frame it receives and sends
//! each line typed on stdin as one frame.

use std::io::Write;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use room_chat::config::{parse_frame_size, DEFAULT_PORT};
use room_chat::frame::{FrameCodec, DEFAULT_FRAME_SIZE};
use room_chat::ClientId;

const INPUT_PROMPT: &str = ">>> ";

#[derive(Debug, Parser)]
#[command(name = "room_chat_client", version, about = "Client for the room_chat server")]
struct ClientArgs {
    /// Identifier to register with (at most 20 characters)
    id: String,

    /// Server host
    #[arg(default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Size in bytes of every message frame
    #[arg(long, default_value_t = DEFAULT_FRAME_SIZE, value_parser = parse_frame_size)]
    frame_size: usize,
}

fn prompt() {
    print!("{}", INPUT_PROMPT);
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = ClientArgs::parse();
    let id = ClientId::parse(&args.id)?;

    println!(
        "Welcome to the application, {}! We are connecting to {}:{}...",
        id, args.host, args.port
    );

    let stream = TcpStream::connect((args.host.as_str(), args.port)).await?;
    let server_addr = stream.peer_addr()?;
    let (read_half, write_half) = stream.into_split();

    let mut writer = FramedWrite::new(write_half, FrameCodec::registration());
    writer.send(id.to_string()).await?;
    writer.encoder_mut().set_frame_size(args.frame_size);

    let mut incoming = FramedRead::new(read_half, FrameCodec::new(args.frame_size));
    let mut input = FramedRead::new(tokio::io::stdin(), LinesCodec::new());

    prompt();
    loop {
        tokio::select! {
            frame = incoming.next() => match frame {
                Some(Ok(text)) => {
                    println!("\r{}", text);
                    prompt();
                }
                Some(Err(e)) => {
                    warn!("Read error: {}", e);
                    break;
                }
                None => {
                    println!(
                        "\nServer with address {} has disconnected from the client.",
                        server_addr
                    );
                    break;
                }
            },
            line = input.next() => match line {
                Some(Ok(line)) => {
                    writer.send(line).await?;
                    prompt();
                }
                Some(Err(e)) => {
                    warn!("Input error: {}", e);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nClosing client...");
                break;
            }
        }
    }

    let _ = writer.get_mut().shutdown().await;
    Ok(())
}
