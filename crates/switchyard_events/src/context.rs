//! Per-invocation context handed to handlers.
//!
//! Every dispatched message gets its own [`RequestContext`]. It carries the
//! raw request text, the parsed envelope, a cancellation token tied to the
//! connection the message arrived on, and a [`Replier`] that sends messages
//! back over that same connection.

use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::resolver::InstanceResolver;
use crate::types::ClientId;
use async_trait::async_trait;
use serde::Serialize;
use std::any::{type_name, Any};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Back-reference to the connection a message arrived on.
///
/// The server implements this over an accepted connection and the client
/// worker over its single outbound connection.
#[async_trait]
pub trait Replier: Send + Sync {
    /// Queues `envelope` for delivery to the peer.
    async fn reply(&self, envelope: &Envelope) -> Result<(), DispatchError>;

    /// Whether the underlying connection still accepts messages.
    fn is_open(&self) -> bool;
}

/// Where a dispatched message came from.
///
/// Built by the receive loop once per message and turned into a
/// [`RequestContext`] by the dispatcher.
#[derive(Clone)]
pub struct DispatchOrigin {
    pub replier: Arc<dyn Replier>,
    pub cancellation: CancellationToken,
    pub client_id: Option<ClientId>,
}

impl DispatchOrigin {
    pub fn new(replier: Arc<dyn Replier>, cancellation: CancellationToken) -> Self {
        Self {
            replier,
            cancellation,
            client_id: None,
        }
    }

    pub fn with_client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }
}

/// Context available to a handler for the duration of one invocation.
#[derive(Clone)]
pub struct RequestContext {
    raw: Arc<str>,
    envelope: Arc<Envelope>,
    origin: DispatchOrigin,
    services: Arc<dyn InstanceResolver>,
}

impl RequestContext {
    pub(crate) fn new(
        raw: Arc<str>,
        envelope: Arc<Envelope>,
        origin: DispatchOrigin,
        services: Arc<dyn InstanceResolver>,
    ) -> Self {
        Self {
            raw,
            envelope,
            origin,
            services,
        }
    }

    /// The request exactly as it arrived on the wire.
    pub fn raw_request(&self) -> &str {
        &self.raw
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn event(&self) -> &str {
        &self.envelope.event
    }

    /// Cancelled when the originating connection shuts down.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.origin.cancellation
    }

    /// Identity the originating connection was admitted under, if any.
    ///
    /// Always `None` on the client side.
    pub fn client_id(&self) -> Option<ClientId> {
        self.origin.client_id
    }

    /// Resolves a service from the same resolver that produced the channel.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Unresolved`] if the resolver does not know `T`.
    pub fn service<T: Any + Send>(&self) -> Result<T, DispatchError> {
        self.services
            .resolve::<T>()
            .ok_or(DispatchError::Unresolved(type_name::<T>()))
    }

    /// Sends `envelope` back over the originating connection.
    pub async fn send(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        self.origin.replier.reply(envelope).await
    }

    /// Builds an envelope from `event` and `body` and sends it back.
    pub async fn reply<T: Serialize>(&self, event: &str, body: &T) -> Result<(), DispatchError> {
        let envelope = Envelope::with_body(event, body)?;
        self.send(&envelope).await
    }

    pub fn is_connection_open(&self) -> bool {
        self.origin.replier.is_open()
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("event", &self.envelope.event)
            .field("client_id", &self.origin.client_id)
            .field("cancelled", &self.origin.cancellation.is_cancelled())
            .finish()
    }
}
