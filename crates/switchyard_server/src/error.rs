//! Error types for the session layer.

use crate::framing::CloseReason;
use crate::shards::ShardId;
use switchyard_events::RegistrationError;

/// Errors that stop the server itself.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related error (binding or serving)
    #[error("Network error: {0}")]
    Network(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A channel failed to register at startup
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),
    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reading from or writing to a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("send failed: {0}")]
    Send(String),
    /// The connection no longer accepts messages
    #[error("connection closed")]
    Closed,
}

/// Why a session ended before or during its active phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Missing, unknown, reused or expired invite
    #[error("admission denied: {0}")]
    AdmissionDenied(String),
    /// The invite points at a shard the registry no longer holds
    #[error("shard {0} not found")]
    ShardNotFound(ShardId),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors surfaced by the reconnecting client worker.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid connection request: {0}")]
    InvalidRequest(String),
    #[error("connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    /// The server closed the connection; expected, the worker reconnects
    #[error("connection closed by remote{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    RemoteClosed(Option<CloseReason>),
    #[error("connection ended without a close frame")]
    StreamEnded,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("not connected")]
    NotConnected,
}
