//! Connection representation and outbound queueing.
//!
//! A [`Connection`] is the shareable handle to one admitted socket. It does
//! not own the transport: outbound frames go through an unbounded queue to
//! the writer task, which is the sole owner of the sink.

use crate::error::TransportError;
use crate::framing::{CloseReason, OutboundFrame};
use crate::server::handshake::RequestMetadata;
use crate::shards::{Shard, ShardId};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;
use switchyard_events::{ClientId, Envelope, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a connection as seen by senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Represents one admitted client connection.
///
/// The connection knows its shard only through a weak reference; the
/// [`ShardRegistry`](crate::shards::ShardRegistry) owns shards.
///
/// # Fields
///
/// * `session_id` - Unique per accepted socket
/// * `client_id` - Identity taken from the redeemed invite
/// * `metadata` - Headers, cookies and remote address of the upgrade request
#[derive(Debug)]
pub struct Connection {
    session_id: SessionId,
    client_id: ClientId,
    shard_id: ShardId,
    shard: Weak<Shard>,
    metadata: RequestMetadata,
    connected_at: SystemTime,
    state: AtomicU8,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    cancellation: CancellationToken,
}

impl Connection {
    /// Creates an open connection attached to nothing yet.
    ///
    /// # Arguments
    ///
    /// * `client_id` - Identity the connection was admitted under
    /// * `shard` - Shard the connection will be attached to
    /// * `metadata` - Request metadata captured during the upgrade
    /// * `outbound` - Queue drained by the connection's writer task
    /// * `cancellation` - Stops the receive loop; fired by [`Connection::close`]
    pub fn new(
        client_id: ClientId,
        shard: &Arc<Shard>,
        metadata: RequestMetadata,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            session_id: SessionId::new(),
            client_id,
            shard_id: shard.id(),
            shard: Arc::downgrade(shard),
            metadata,
            connected_at: SystemTime::now(),
            state: AtomicU8::new(ConnectionState::Open as u8),
            outbound,
            cancellation,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    /// The shard this connection belongs to, if it still exists.
    pub fn shard(&self) -> Option<Arc<Shard>> {
        self.shard.upgrade()
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.metadata.remote_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// Cancelled once the connection starts closing or the server stops.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether messages queued now can still reach the peer.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open && !self.outbound.is_closed()
    }

    /// Queues pre-serialized text for the writer task.
    pub fn send_text(&self, text: Arc<str>) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Open {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(OutboundFrame::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    /// Serializes `envelope` and queues it.
    pub fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let text = envelope
            .to_json()
            .map_err(|error| TransportError::Send(error.to_string()))?;
        self.send_text(Arc::from(text))
    }

    /// Starts the close handshake and stops the receive loop.
    ///
    /// Returns `false` if the connection was already closing; only the
    /// first caller gets to queue a close frame.
    pub fn close(&self, reason: CloseReason) -> bool {
        let won = self
            .state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            // The writer may already be gone; nothing to flush then.
            let _ = self.outbound.send(OutboundFrame::Close(reason));
            self.cancellation.cancel();
        }
        won
    }

    pub(crate) fn mark_closed(&self) {
        self.state.store(ConnectionState::Closed as u8, Ordering::Release);
    }
}
