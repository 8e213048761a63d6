//! Session registry
//!
//! Bounded directory of active sessions keyed by client identifier.
//! Owned by the `ChatServer` actor, which serializes every call.

use std::collections::BTreeMap;

use crate::error::RegisterError;
use crate::session::Session;
use crate::types::ClientId;

/// Directory of live sessions
///
/// Invariants:
/// - at most `max_clients` sessions
/// - identifiers are unique
/// - the reserved room name is never registered
#[derive(Debug)]
pub struct Registry {
    sessions: BTreeMap<ClientId, Session>,
    max_clients: usize,
}

impl Registry {
    /// Create an empty registry holding at most `max_clients` sessions
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            max_clients,
        }
    }

    /// Admit a session
    ///
    /// Checks, in order: reserved name, uniqueness, capacity.
    pub fn try_register(&mut self, session: Session) -> Result<&Session, RegisterError> {
        if session.id.is_reserved() {
            return Err(RegisterError::Reserved);
        }
        if self.sessions.contains_key(&session.id) {
            return Err(RegisterError::AlreadyExists);
        }
        if self.is_full() {
            return Err(RegisterError::Full);
        }
        let id = session.id.clone();
        Ok(self.sessions.entry(id).or_insert(session))
    }

    /// Find a session by identifier
    pub fn lookup(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Remove a session; removing an absent identifier is a no-op
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// All live sessions, ordered by identifier
    pub fn snapshot_all(&self) -> Vec<&Session> {
        self.sessions.values().collect()
    }

    /// Number of live sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_clients
    }

    /// Drop every session, closing all writer queues
    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}
