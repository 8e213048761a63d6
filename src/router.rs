//! Routing of parsed commands
//!
//! Turns a `Command` into the frames each session should receive. Routing
//! only reads the registry; membership changes belong to the actor.

use crate::command::Command;
use crate::registry::Registry;
use crate::types::{ClientId, ROOM};

/// One frame of text destined for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: ClientId,
    pub text: String,
}

impl Delivery {
    fn new(to: &ClientId, text: impl Into<String>) -> Self {
        Self {
            to: to.clone(),
            text: text.into(),
        }
    }
}

/// Line delivered for a chat message
pub fn chat_line(sender: &ClientId, recipient: &str, message: &str) -> String {
    format!("{}-->[{}]: {}", sender, recipient, message)
}

/// Line announcing a new session
pub fn join_line(joined: &ClientId) -> String {
    format!("{} has joined the Public Room!", joined)
}

/// Compute the deliveries for one command
///
/// Errors are addressed to the sender only and never reach other sessions.
pub fn route(registry: &Registry, command: &Command) -> Vec<Delivery> {
    match command {
        Command::BroadcastSend { sender, message } => {
            let line = chat_line(sender, ROOM, message);
            registry
                .snapshot_all()
                .into_iter()
                .map(|session| Delivery::new(&session.id, line.clone()))
                .collect()
        }
        Command::DirectedSend {
            sender,
            recipient,
            message,
        } => {
            let Some(target) = registry.lookup(recipient) else {
                return vec![Delivery::new(
                    sender,
                    format!("Could not find a client with ID {}", recipient),
                )];
            };
            if &target.id == sender {
                return vec![Delivery::new(sender, "You can't send a message to yourself!")];
            }
            let line = chat_line(sender, recipient, message);
            vec![
                Delivery::new(&target.id, line.clone()),
                Delivery::new(sender, line),
            ]
        }
        Command::Malformed { sender, reason } => vec![Delivery::new(sender, reason.to_string())],
    }
}

/// Join notice for every session except the one that just joined
pub fn join_notice(registry: &Registry, joined: &ClientId) -> Vec<Delivery> {
    let line = join_line(joined);
    registry
        .snapshot_all()
        .into_iter()
        .filter(|session| &session.id != joined)
        .map(|session| Delivery::new(&session.id, line.clone()))
        .collect()
}
