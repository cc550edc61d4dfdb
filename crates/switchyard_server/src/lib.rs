//! # Switchyard Server
//!
//! WebSocket session layer: admission by single-use invite, in-process
//! sharding of connections, a directory of admitted clients, and a
//! reconnecting client worker that shares the same framing code.
//!
//! ## Architecture
//!
//! * [`SocketServer`] owns the [`ShardRegistry`], the [`InviteLedger`] and
//!   the [`ClientDirectory`], and exposes the side channel used to issue
//!   invites and push messages
//! * [`SessionHandler`] drives one accepted socket from handshake to
//!   teardown
//! * [`ClientWorker`] keeps an outbound connection alive and dispatches
//!   what it receives
//!
//! Inbound text messages on both sides are routed by a
//! [`switchyard_events::Dispatcher`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchyard_events::{Dispatcher, ServiceRegistry};
//! use switchyard_server::{ServerConfig, SocketServer};
//!
//! # async fn run() -> Result<(), switchyard_server::ServerError> {
//! let dispatcher = Dispatcher::builder(Arc::new(ServiceRegistry::new())).build();
//! let server = SocketServer::new(ServerConfig::default(), Arc::new(dispatcher));
//! let listener = server.bind().await?;
//! server.serve(listener).await
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod framing;
pub mod invites;
pub mod messaging;
pub mod pool;
pub mod server;
pub mod shards;

pub use client::{source_fn, ClientWorker, ConnectSource, ConnectTarget};
pub use config::{ClientConfig, ServerConfig};
pub use connection::{ClientDirectory, Connection, ConnectionState, DirectoryEntry, SendOutcome};
pub use error::{ClientError, ServerError, SessionError, TransportError};
pub use framing::{close_code, CloseReason, LoopExit};
pub use invites::{Invite, InviteLedger, InviteRejection};
pub use messaging::{BroadcastReport, Broadcaster};
pub use server::{
    ConnectionInfo, InviteRequest, NoopHooks, RequestMetadata, SessionHandler, SessionHooks, SessionOutcome,
    SessionState, SocketServer, Statistics, INVITE_TOKEN_NAME,
};
pub use shards::{Shard, ShardId, ShardRegistry, ShardSnapshot};
