//! Core socket server implementation.
//!
//! This module contains the `SocketServer` struct, which owns the shared
//! registries every session works against and exposes the side-channel API
//! used by the rest of the application to issue invites and push messages.

use super::endpoint;
use super::session::{NoopHooks, SessionHooks};
use crate::config::ServerConfig;
use crate::connection::{ClientDirectory, Connection, SendOutcome};
use crate::error::ServerError;
use crate::invites::InviteLedger;
use crate::messaging::{BroadcastReport, Broadcaster};
use crate::pool::{shared_pool, BufferPool, DEFAULT_SCRATCH_SIZE};
use crate::shards::{ShardRegistry, ShardSnapshot};
use parking_lot::Mutex;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use switchyard_events::{ClientId, Dispatcher, Envelope};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Buffers kept by a server-specific pool.
const PRIVATE_POOL_RETAINED: usize = 64;

/// What a client needs to open an admitted connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Upgrade URL of the shard the invite points at
    pub url: String,
    /// Single-use invite token, sent as `x-token-invite`
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Point-in-time server statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub shard_count: usize,
    pub active_shard_count: usize,
    pub total_connections: usize,
    /// Invites held by the ledger, redeemed ones included until they expire
    /// and are reaped
    pub pending_invites: usize,
    /// Held invites that can still be redeemed
    pub unredeemed_invites: usize,
    pub shards: Vec<ShardSnapshot>,
}

/// The socket server.
///
/// `SocketServer` ties the shard registry, the invite ledger and the client
/// directory together. Sessions hold an `Arc` to it; the application holds
/// another and uses it as the side channel to admit clients and reach them.
///
/// # Lifecycle
///
/// * [`SocketServer::start`] ensures a first shard exists and spawns the
///   maintenance task
/// * [`SocketServer::serve`] accepts connections until the shutdown token
///   fires
/// * [`SocketServer::stop`] fires the token, which ends every session, and
///   joins the maintenance task
pub struct SocketServer {
    pub(crate) config: ServerConfig,
    pub(crate) shards: Arc<ShardRegistry>,
    pub(crate) invites: Arc<InviteLedger>,
    pub(crate) directory: Arc<ClientDirectory>,
    pub(crate) broadcaster: Broadcaster,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) hooks: Arc<dyn SessionHooks>,
    pub(crate) pool: Arc<BufferPool>,
    shutdown: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl SocketServer {
    /// Creates a server with no session hooks.
    pub fn new(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Self::with_hooks(config, dispatcher, Arc::new(NoopHooks))
    }

    /// Creates a server whose sessions report to `hooks`.
    ///
    /// # Arguments
    ///
    /// * `config` - Network, sharding and timing settings
    /// * `dispatcher` - Routes inbound text messages; shared by all sessions
    /// * `hooks` - Connect, disconnect and binary message callbacks
    pub fn with_hooks(config: ServerConfig, dispatcher: Arc<Dispatcher>, hooks: Arc<dyn SessionHooks>) -> Arc<Self> {
        let shards = Arc::new(ShardRegistry::new(
            config.connect_url(),
            config.max_connections_per_shard,
            config.shard_idle_threshold,
        ));
        let directory = Arc::new(ClientDirectory::new());
        let pool = if config.scratch_buffer_size == DEFAULT_SCRATCH_SIZE {
            shared_pool()
        } else {
            Arc::new(BufferPool::new(config.scratch_buffer_size, PRIVATE_POOL_RETAINED))
        };

        Arc::new(Self {
            broadcaster: Broadcaster::new(directory.clone()),
            config,
            shards,
            invites: Arc::new(InviteLedger::new()),
            directory,
            dispatcher,
            hooks,
            pool,
            shutdown: CancellationToken::new(),
            maintenance: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn shards(&self) -> &ShardRegistry {
        &self.shards
    }

    pub fn invites(&self) -> &InviteLedger {
        &self.invites
    }

    pub fn directory(&self) -> &ClientDirectory {
        &self.directory
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Token that stops the server. Sessions run on child tokens of it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ensures a shard exists and starts the maintenance task.
    ///
    /// Calling this more than once has no further effect.
    pub fn start(&self) {
        let mut maintenance = self.maintenance.lock();
        if maintenance.is_some() {
            return;
        }
        if self.shards.shard_count() == 0 {
            self.shards.create_shard();
        }

        let shards = self.shards.clone();
        let invites = self.invites.clone();
        let period = self.config.sweep_interval;
        let cancel = self.shutdown.clone();
        *maintenance = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => sweep(&shards, &invites),
                }
            }
            debug!("Maintenance task stopped");
        }));
        info!(interval = ?period, "🧹 Maintenance task started");
    }

    /// Runs one maintenance pass immediately.
    pub fn run_maintenance(&self) {
        sweep(&self.shards, &self.invites);
    }

    /// Stops the server: ends all sessions and joins the maintenance task.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self.maintenance.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Maintenance task failed: {}", e);
            }
        }
        info!("🛑 Socket server stopped");
    }

    /// Issues a single-use invite for `client_id` on the least-loaded shard.
    pub fn issue_invite(&self, client_id: ClientId) -> ConnectionInfo {
        self.invites.reap_expired();
        let shard = self.shards.select_or_create();
        let ttl = self.config.invite_ttl;
        let invite = self.invites.issue(shard.id(), client_id, ttl);
        let expires_at = chrono::DateTime::<chrono::Utc>::from(SystemTime::now() + ttl);

        info!(client = %client_id, shard = %shard.id(), "🎟️ Issued invite");
        ConnectionInfo {
            url: shard.url().to_string(),
            token: invite.token,
            expires_at,
        }
    }

    /// Sends to the client's current connection. See [`ClientDirectory::send_to`].
    pub fn send_to(&self, client_id: &ClientId, envelope: &Envelope) -> SendOutcome {
        self.directory.send_to(client_id, envelope)
    }

    /// Sends to every open connection in an active shard.
    pub fn broadcast(&self, envelope: &Envelope) -> Result<BroadcastReport, serde_json::Error> {
        self.broadcaster.broadcast(envelope)
    }

    /// Sends to the open connections in active shards that satisfy `predicate`.
    pub fn broadcast_filtered<P>(&self, envelope: &Envelope, predicate: P) -> Result<BroadcastReport, serde_json::Error>
    where
        P: Fn(&Connection) -> bool,
    {
        self.broadcaster.broadcast_filtered(envelope, predicate)
    }

    pub fn statistics(&self) -> Statistics {
        let mut shards: Vec<_> = self.shards.snapshot().iter().map(|shard| shard.snapshot()).collect();
        shards.sort_by_key(|shard| shard.created_at);
        Statistics {
            shard_count: shards.len(),
            active_shard_count: shards.iter().filter(|shard| shard.is_active).count(),
            total_connections: shards.iter().map(|shard| shard.current_connections).sum(),
            pending_invites: self.invites.len(),
            unredeemed_invites: self.invites.pending(),
            shards,
        }
    }

    /// The HTTP router serving the upgrade endpoint and, if enabled, the
    /// admin routes.
    pub fn router(self: &Arc<Self>) -> axum::Router {
        endpoint::router(self.clone())
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.config.bind_address).await.map_err(|e| {
            ServerError::Network(format!("Failed to bind {}: {}", self.config.bind_address, e))
        })
    }

    /// Serves connections from `listener` until the shutdown token fires.
    ///
    /// Starts the server if it has not been started yet and stops it once
    /// the listener has drained.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        self.start();
        let local = listener.local_addr()?;
        info!(
            "🌐 Socket server listening on ws://{}{}",
            local, self.config.endpoint_path
        );

        let shutdown = self.shutdown.clone();
        let served = axum::serve(
            listener,
            self.router().into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

        self.stop().await;
        served.map_err(|e| ServerError::Network(e.to_string()))
    }
}

fn sweep(shards: &ShardRegistry, invites: &InviteLedger) {
    let reaped = invites.reap_expired();
    let removed = shards.sweep_idle();
    debug!(
        reaped_invites = reaped,
        removed_shards = removed.len(),
        shards = shards.shard_count(),
        "Maintenance pass complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchyard_events::ServiceRegistry;

    fn server(config: ServerConfig) -> Arc<SocketServer> {
        let dispatcher = Dispatcher::builder(Arc::new(ServiceRegistry::new())).build();
        SocketServer::new(config, Arc::new(dispatcher))
    }

    #[tokio::test]
    async fn issued_invite_points_at_a_shard() {
        let server = server(ServerConfig {
            public_url: Some("wss://example.test/ws".into()),
            ..ServerConfig::default()
        });
        let client = ClientId::new();
        let info = server.issue_invite(client);

        assert_eq!(info.url, "wss://example.test/ws");
        assert_eq!(info.token.len(), 32);
        assert!(info.expires_at > chrono::Utc::now());

        let invite = server.invites().get(&info.token).unwrap();
        assert_eq!(invite.client_id, client);
        assert!(server.shards().get(&invite.shard_id).is_some());
    }

    #[tokio::test]
    async fn statistics_reflect_registries() {
        let server = server(ServerConfig::default());
        server.start();
        let redeemed = server.issue_invite(ClientId::new());
        server.issue_invite(ClientId::new());
        server.invites().validate(&redeemed.token).unwrap();

        let stats = server.statistics();
        assert_eq!(stats.shard_count, 1);
        assert_eq!(stats.active_shard_count, 1);
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.pending_invites, 2);
        assert_eq!(stats.unredeemed_invites, 1);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["shards"][0]["max_connections"], 100);
        server.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn maintenance_reaps_expired_invites() {
        let server = server(ServerConfig {
            invite_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            ..ServerConfig::default()
        });
        server.start();
        let info = server.issue_invite(ClientId::new());
        assert_eq!(server.invites().len(), 1);

        tokio::time::sleep(Duration::from_secs(250)).await;
        assert!(server.invites().get(&info.token).is_some());

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(server.invites().is_empty());
        server.stop().await;
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_joins() {
        let server = server(ServerConfig::default());
        server.start();
        server.start();
        assert_eq!(server.shards().shard_count(), 1);

        server.stop().await;
        assert!(server.shutdown_token().is_cancelled());
    }
}
