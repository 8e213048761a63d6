//! Error types for the chat server
//!
//! Defines connection-level errors, registration and command errors whose
//! `Display` text is sent verbatim to clients, and delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Fatal for the connection they occur on, never for the process.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the transport (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - server actor gone)
    #[error("Channel send error")]
    ChannelSend,

    /// Registration refused
    #[error("Registration refused: {0}")]
    Register(#[from] RegisterError),
}

/// Registration errors
///
/// The message of each variant is the exact text sent to the rejected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// Identifier is empty, too long or contains forbidden characters
    #[error("The client ID must be between 1 and 20 characters and contain no quotes.")]
    Invalid,

    /// Identifier is the reserved room name
    #[error("The client's client ID cannot be \"room\"")]
    Reserved,

    /// Identifier is held by a live session
    #[error("This ID is already in use.")]
    AlreadyExists,

    /// Registry is at capacity
    #[error("There isn't enough space on the server for a new client.")]
    Full,
}

/// Command syntax errors
///
/// The message of each variant is the exact reply sent to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("The command has too many arguments! Usage: send \"<RECIPIENT>\" \"<MESSAGE>\"")]
    TooManyArguments,

    #[error("Incorrect Syntax! Usage: send \"<RECIPIENT>\" \"<MESSAGE>\"")]
    Syntax,
}

/// Message send errors
///
/// Occurs when a frame cannot be queued for a session's writer.
#[derive(Debug, Error)]
pub enum SendError {
    /// The session's outbound queue is full (slow reader)
    #[error("Queue full")]
    QueueFull,

    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
