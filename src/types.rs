//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: client-chosen identifier, validated at registration
//! - `ConnId`: UUID-based identifier of one accepted connection

use uuid::Uuid;

use crate::error::RegisterError;

/// Pseudo-recipient meaning "every active session". Never a valid session id.
pub const ROOM: &str = "room";

/// Maximum identifier length in bytes
pub const MAX_ID_LEN: usize = 20;

/// Client identifier (newtype pattern)
///
/// Chosen by the client in its registration frame. Between 1 and
/// `MAX_ID_LEN` bytes, without NUL or quote characters so that it can
/// always be addressed through the `send "<id>" "<message>"` grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Validate a raw identifier
    pub fn parse(raw: &str) -> Result<Self, RegisterError> {
        if raw.is_empty() || raw.len() > MAX_ID_LEN || raw.contains(['\0', '"']) {
            return Err(RegisterError::Invalid);
        }
        Ok(Self(raw.to_string()))
    }

    /// Whether this is the reserved room name
    pub fn is_reserved(&self) -> bool {
        self.0 == ROOM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::borrow::Borrow<str> for ClientId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Unique connection identifier (newtype pattern)
///
/// Assigned on accept, before the client has registered, so that log
/// lines of one connection can be correlated. Also lets the registry
/// tell a session apart from a later one reusing the same `ClientId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub Uuid);

impl ConnId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
