//! Server and client configuration types and defaults.
//!
//! This module contains the configuration structures used to initialize the
//! socket server and the reconnecting client worker.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration structure for the socket server.
///
/// Contains the network binding, the sharding limits and the timings of the
/// background maintenance task.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Path of the upgrade endpoint
    pub endpoint_path: String,

    /// Absolute URL handed out with invites (defaults to `endpoint_path`)
    pub public_url: Option<String>,

    /// Connections a shard accepts before new invites go elsewhere
    pub max_connections_per_shard: usize,

    /// How long an issued invite stays redeemable
    pub invite_ttl: Duration,

    /// Age after which an empty shard may be reclaimed
    pub shard_idle_threshold: Duration,

    /// Period of the idle shard and expired invite sweep
    pub sweep_interval: Duration,

    /// Initial capacity of pooled receive buffers
    pub scratch_buffer_size: usize,

    /// How long teardown waits for the close handshake to flush
    pub close_timeout: Duration,

    /// Whether to mount `POST /invites` and `GET /stats`
    pub admin_routes: bool,
}

impl ServerConfig {
    /// The URL clients should connect to with an invite.
    pub fn connect_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| self.endpoint_path.clone())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 5000)),
            endpoint_path: "/ws".to_string(),
            public_url: None,
            max_connections_per_shard: 100,
            invite_ttl: Duration::from_secs(5 * 60),
            shard_idle_threshold: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(60),
            scratch_buffer_size: 4 * 1024,
            close_timeout: Duration::from_secs(5),
            admin_routes: false,
        }
    }
}

/// Configuration of the reconnecting client worker.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL to connect to
    pub url: String,

    /// Extra request headers sent with every connection attempt
    pub headers: HashMap<String, String>,

    /// Cookies sent as a single `Cookie` header
    pub cookies: HashMap<String, String>,

    /// Pause between a failed or closed connection and the next attempt
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5000/ws".to_string(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            reconnect_delay: Duration::from_secs(3),
        }
    }
}
