//! # Session Handler
//!
//! Drives one accepted socket from handshake to teardown:
//!
//! ```text
//! Pending -> Authenticating -> Admitted -> Active -> Closing -> Closed
//!    \______________\_______________\______________________/
//!                 (any admission failure)
//! ```
//!
//! The handler is transport-neutral. It receives a stream of [`Frame`]s and
//! a sink of [`OutboundFrame`]s, so the axum endpoint and the tests drive
//! exactly the same code.

use super::core::SocketServer;
use super::handshake::RequestMetadata;
use crate::connection::{Connection, ConnectionReplier};
use crate::error::{SessionError, TransportError};
use crate::framing::{receive_loop, write_loop, CloseReason, Frame, InboundMessage, LoopExit, OutboundFrame};
use crate::invites::Invite;
use crate::shards::Shard;
use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream};
use std::sync::Arc;
use switchyard_events::{ClientId, DispatchOrigin, Replier, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Close reason sent when the server ends a session.
pub const SERVER_CLOSE_REASON: &str = "Closed by server";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Authenticating,
    Admitted,
    Active,
    Closing,
    Closed,
}

/// Callbacks around the lifetime of an admitted connection.
///
/// All methods default to doing nothing.
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// Runs after the connection is registered, before the first message.
    async fn on_connect(&self, _connection: &Arc<Connection>) {}

    /// Runs after the connection is unregistered, before the close handshake.
    async fn on_disconnect(&self, _connection: &Arc<Connection>, _exit: &LoopExit) {}

    /// Receives complete binary messages. Each call runs on its own task.
    async fn on_binary(&self, _connection: &Arc<Connection>, _data: Vec<u8>) {}
}

/// Hooks that ignore every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Admission failed and the socket was closed with `close`
    Rejected { error: SessionError, close: CloseReason },
    /// The session was admitted and has since been torn down
    Completed {
        client_id: ClientId,
        session_id: SessionId,
        exit: LoopExit,
    },
}

/// Owns one accepted socket for its whole lifetime.
pub struct SessionHandler {
    server: Arc<SocketServer>,
    metadata: RequestMetadata,
    state: SessionState,
}

impl SessionHandler {
    pub fn new(server: Arc<SocketServer>, metadata: RequestMetadata) -> Self {
        Self {
            server,
            metadata,
            state: SessionState::Pending,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }

    /// Runs the session to completion.
    ///
    /// `cancel` stops the receive loop between frame reads; the session
    /// then tears down as if the peer had gone away.
    pub async fn run<St, Si>(mut self, mut stream: St, sink: Si, cancel: CancellationToken) -> SessionOutcome
    where
        St: Stream<Item = Result<Frame, TransportError>> + Unpin + Send,
        Si: Sink<OutboundFrame, Error = TransportError> + Unpin + Send + 'static,
    {
        let (invite, shard) = match self.admit() {
            Ok(admitted) => admitted,
            Err((error, close)) => {
                warn!(remote = ?self.metadata.remote_addr, %error, "🚫 Session rejected");
                self.transition(SessionState::Closed);
                reject(sink, close.clone()).await;
                return SessionOutcome::Rejected { error, close };
            }
        };

        let (outbound, queue) = mpsc::unbounded_channel();
        let mut writer = tokio::spawn(write_loop(sink, queue));
        let connection = Arc::new(Connection::new(
            invite.client_id,
            &shard,
            self.metadata.clone(),
            outbound,
            cancel.child_token(),
        ));
        let client_id = connection.client_id();
        let session_id = connection.session_id();

        if !self.register(&connection, &shard) {
            let error = SessionError::ShardNotFound(shard.id());
            let close = CloseReason::internal_error("Instance not found");
            warn!(client = %client_id, %error, "🚫 Session rejected");
            self.transition(SessionState::Closed);
            connection.close(close.clone());
            drop(connection);
            if tokio::time::timeout(self.server.config.close_timeout, &mut writer).await.is_err() {
                writer.abort();
            }
            return SessionOutcome::Rejected { error, close };
        }
        self.server.hooks.on_connect(&connection).await;
        self.transition(SessionState::Active);

        let exit = self.receive(&mut stream, &connection).await;

        self.transition(SessionState::Closing);
        shard.detach(&session_id);
        self.server.directory.remove_session(&client_id, session_id);
        self.server.hooks.on_disconnect(&connection, &exit).await;

        connection.close(CloseReason::normal(SERVER_CLOSE_REASON));
        match tokio::time::timeout(self.server.config.close_timeout, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(session = %session_id, %error, "Writer task failed"),
            Err(_) => {
                debug!(session = %session_id, "Close handshake timed out, dropping transport");
                writer.abort();
            }
        }
        connection.mark_closed();
        self.transition(SessionState::Closed);

        info!(client = %client_id, session = %session_id, ?exit, "🔌 Client disconnected");
        SessionOutcome::Completed {
            client_id,
            session_id,
            exit,
        }
    }

    fn admit(&mut self) -> Result<(Invite, Arc<Shard>), (SessionError, CloseReason)> {
        self.transition(SessionState::Authenticating);
        let Some(token) = self.metadata.invite_token().map(str::to_owned) else {
            return Err((
                SessionError::AdmissionDenied("no token presented".to_string()),
                CloseReason::policy_violation("Authentication error: No token found"),
            ));
        };

        self.transition(SessionState::Admitted);
        let invite = self.server.invites.validate(&token).map_err(|rejection| {
            let reason = rejection.to_string();
            (
                SessionError::AdmissionDenied(reason.clone()),
                CloseReason::policy_violation(reason),
            )
        })?;

        let shard = self.server.shards.get(&invite.shard_id).ok_or_else(|| {
            (
                SessionError::ShardNotFound(invite.shard_id),
                CloseReason::internal_error("Instance not found"),
            )
        })?;
        Ok((invite, shard))
    }

    /// Attaches the connection to its shard and the directory. Returns
    /// `false` if the shard was swept after admission resolved it.
    fn register(&self, connection: &Arc<Connection>, shard: &Arc<Shard>) -> bool {
        if !self.server.shards.attach_live(shard, connection.clone()) {
            return false;
        }
        if let Some(previous) = self.server.directory.put(connection.clone(), shard.clone()) {
            if previous.connection.close(CloseReason::normal("Superseded by a newer session")) {
                info!(
                    client = %connection.client_id(),
                    previous = %previous.connection.session_id(),
                    "♻️ Superseded existing session"
                );
            }
        }
        info!(
            client = %connection.client_id(),
            session = %connection.session_id(),
            shard = %shard.id(),
            remote = ?connection.remote_addr(),
            "🔗 Client connected"
        );
        true
    }

    async fn receive<St>(&self, stream: &mut St, connection: &Arc<Connection>) -> LoopExit
    where
        St: Stream<Item = Result<Frame, TransportError>> + Unpin + Send,
    {
        let replier: Arc<dyn Replier> = Arc::new(ConnectionReplier::new(connection.clone()));
        let origin = DispatchOrigin::new(replier, connection.cancellation().clone())
            .with_client(connection.client_id());
        let dispatcher = self.server.dispatcher.clone();
        let hooks = self.server.hooks.clone();

        receive_loop(stream, &self.server.pool, connection.cancellation(), |message| match message {
            InboundMessage::Text(text) => {
                dispatcher.dispatch_text(&text, origin.clone());
            }
            InboundMessage::Binary(data) => {
                let hooks = hooks.clone();
                let connection = connection.clone();
                tokio::spawn(async move { hooks.on_binary(&connection, data).await });
            }
        })
        .await
    }
}

/// Best-effort close of a socket that was never admitted.
async fn reject<Si>(mut sink: Si, close: CloseReason)
where
    Si: Sink<OutboundFrame, Error = TransportError> + Unpin,
{
    if let Err(error) = sink.send(OutboundFrame::Close(close)).await {
        debug!(%error, "Could not deliver rejection close frame");
    }
    let _ = sink.close().await;
}
