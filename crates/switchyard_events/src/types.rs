//! # Core Type Definitions
//!
//! Identifier types shared by the server and the client sides of the
//! session layer.
//!
//! ## Key Types
//!
//! - [`ClientId`] - Identity a connection is admitted under
//! - [`SessionId`] - Identity of one accepted socket
//!
//! Both are thin wrappers around [`Uuid`] so they cannot be confused with
//! one another at call sites.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a client as named by the invite it was admitted with.
///
/// A client identity outlives individual sockets: when a client reconnects
/// with a fresh invite for the same identity, the new session takes over
/// the directory entry of the old one.
///
/// # Examples
///
/// ```rust
/// use switchyard_events::ClientId;
///
/// let client = ClientId::new();
/// let parsed: ClientId = client.to_string().parse().unwrap();
/// assert_eq!(client, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Creates a new random client ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a single accepted socket.
///
/// Unlike [`ClientId`], a session id is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
