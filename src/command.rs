//! Command parsing
//!
//! A registered client sends text of the form
//!
//! ```text
//! send "<RECIPIENT>" "<MESSAGE>"
//! ```
//!
//! where the recipient `room` addresses every connected client. Quote
//! characters cannot appear inside the recipient or the message; there is
//! no escaping.

use crate::error::ParseError;
use crate::types::{ClientId, ROOM};

const QUOTE: char = '"';

/// A parsed client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Message for every active session
    BroadcastSend { sender: ClientId, message: String },
    /// Message for a single recipient
    DirectedSend {
        sender: ClientId,
        recipient: String,
        message: String,
    },
    /// Text that does not follow the grammar
    Malformed { sender: ClientId, reason: ParseError },
}

impl Command {
    pub fn sender(&self) -> &ClientId {
        match self {
            Command::BroadcastSend { sender, .. }
            | Command::DirectedSend { sender, .. }
            | Command::Malformed { sender, .. } => sender,
        }
    }
}

/// Parse one payload received from `sender`
pub fn parse(sender: &ClientId, payload: &str) -> Command {
    match split_send(payload) {
        Ok((recipient, message)) if recipient == ROOM => Command::BroadcastSend {
            sender: sender.clone(),
            message: message.to_string(),
        },
        Ok((recipient, message)) => Command::DirectedSend {
            sender: sender.clone(),
            recipient: recipient.to_string(),
            message: message.to_string(),
        },
        Err(reason) => Command::Malformed {
            sender: sender.clone(),
            reason,
        },
    }
}

/// Split a payload into `(recipient, message)`
///
/// Empty segments between quotes are skipped, so an empty recipient or
/// message shifts the remaining segments and fails the syntax check.
fn split_send(payload: &str) -> Result<(&str, &str), ParseError> {
    let mut parts = [""; 4];
    let mut count = 0;
    for segment in payload.split(QUOTE).filter(|s| !s.is_empty()) {
        if count == parts.len() {
            return Err(ParseError::TooManyArguments);
        }
        parts[count] = segment;
        count += 1;
    }

    if count < parts.len() {
        return Err(ParseError::Syntax);
    }
    let [name, recipient, separator, message] = parts;
    if name.strip_suffix(' ') != Some("send") || separator != " " || !payload.ends_with(QUOTE) {
        return Err(ParseError::Syntax);
    }
    Ok((recipient, message))
}
