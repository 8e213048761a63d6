//! Chat Server - Entry Point
//!
//! Parses the command line, starts the listener and serves until the last
//! client leaves or a termination signal arrives.

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use room_chat::server::local_addr;
use room_chat::{serve, ServerConfig};

const SIGINT: i32 = 2;
const SIGTERM: i32 = 15;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=room_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("room_chat=info")),
        )
        .init();

    let config = ServerConfig::parse();

    let listener = TcpListener::bind(config.bind_addr()).await?;
    match local_addr(&listener) {
        Some(addr) => info!("Chat Server listening on {}", addr),
        None => info!("Chat Server listening on {}", config.bind_addr()),
    }

    let shutdown = CancellationToken::new();
    let signals = tokio::spawn(watch_signals(shutdown.clone()));

    serve(listener, config, shutdown).await;

    // Report a signal the way the shell would for default termination
    if let Ok(Some(signo)) = signals.await {
        std::process::exit(128 + signo);
    }
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM, returning the signal number
async fn watch_signals(shutdown: CancellationToken) -> Option<i32> {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signo = tokio::select! {
        _ = shutdown.cancelled() => return None,
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Cannot listen for Ctrl-C: {}", e);
                return None;
            }
            SIGINT
        }
        _ = terminate => SIGTERM,
    };

    info!("Closing server...");
    shutdown.cancel();
    Some(signo)
}
