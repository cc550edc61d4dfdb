//! Configuration management for the Switchyard binary.
//!
//! This module handles loading, validation, and conversion of configuration
//! from TOML files into the library's [`ServerConfig`] and [`ClientConfig`].

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use switchyard_server::{ClientConfig, ServerConfig};
use tracing::info;

fn default_bind_address() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_endpoint_path() -> String {
    "/ws".to_string()
}

fn default_max_connections_per_shard() -> usize {
    100
}

fn default_invite_ttl_secs() -> u64 {
    5 * 60
}

fn default_shard_idle_secs() -> u64 {
    10 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_scratch_buffer_size() -> usize {
    4 * 1024
}

fn default_close_timeout_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_client_url() -> String {
    "ws://localhost:5000/ws".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    3
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Client settings, used when running with `--connect`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientSettings>,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Durations are whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:5000")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Path of the WebSocket upgrade endpoint
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    /// Absolute URL handed out with invites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default = "default_max_connections_per_shard")]
    pub max_connections_per_shard: usize,
    #[serde(default = "default_invite_ttl_secs")]
    pub invite_ttl_secs: u64,
    #[serde(default = "default_shard_idle_secs")]
    pub shard_idle_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_scratch_buffer_size")]
    pub scratch_buffer_size: usize,
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,
    /// Mount `POST /invites` and `GET /stats`
    #[serde(default = "default_true")]
    pub admin_routes: bool,
}

/// Reconnecting client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSettings {
    #[serde(default = "default_client_url")]
    pub url: String,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Period of the demo `ping` sent while connected (0 disables it)
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub cookies: HashMap<String, String>,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            endpoint_path: default_endpoint_path(),
            public_url: None,
            max_connections_per_shard: default_max_connections_per_shard(),
            invite_ttl_secs: default_invite_ttl_secs(),
            shard_idle_secs: default_shard_idle_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            scratch_buffer_size: default_scratch_buffer_size(),
            close_timeout_secs: default_close_timeout_secs(),
            admin_routes: true,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: default_client_url(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written
    /// at the specified path and the default configuration is returned.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the server settings into the library configuration.
    pub fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        let server = &self.server;
        Ok(ServerConfig {
            bind_address: server
                .bind_address
                .parse()
                .with_context(|| format!("Invalid bind address: {}", server.bind_address))?,
            endpoint_path: server.endpoint_path.clone(),
            public_url: server.public_url.clone(),
            max_connections_per_shard: server.max_connections_per_shard,
            invite_ttl: Duration::from_secs(server.invite_ttl_secs),
            shard_idle_threshold: Duration::from_secs(server.shard_idle_secs),
            sweep_interval: Duration::from_secs(server.sweep_interval_secs),
            scratch_buffer_size: server.scratch_buffer_size,
            close_timeout: Duration::from_secs(server.close_timeout_secs),
            admin_routes: server.admin_routes,
        })
    }

    /// The client configuration, with `url` and `token` taking precedence
    /// over the file.
    pub fn to_client_config(&self, url: Option<&str>, token: Option<&str>) -> ClientConfig {
        let settings = self.client.clone().unwrap_or_default();
        let mut config = ClientConfig::new(url.unwrap_or(&settings.url));
        config.headers = settings.headers;
        config.cookies = settings.cookies;
        config.reconnect_delay = Duration::from_secs(settings.reconnect_delay_secs);
        match token {
            Some(token) => config.with_header(switchyard_server::INVITE_TOKEN_NAME, token),
            None => config,
        }
    }

    /// Checks the configuration for values the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            bail!("Invalid bind address: {}", self.server.bind_address);
        }
        if !self.server.endpoint_path.starts_with('/') {
            bail!("Endpoint path must start with '/': {}", self.server.endpoint_path);
        }
        if self.server.admin_routes && matches!(self.server.endpoint_path.as_str(), "/invites" | "/stats") {
            bail!("Endpoint path {} collides with an admin route", self.server.endpoint_path);
        }
        if self.server.max_connections_per_shard == 0 {
            bail!("max_connections_per_shard must be at least 1");
        }
        if self.server.invite_ttl_secs == 0 {
            bail!("invite_ttl_secs must be at least 1");
        }
        if self.server.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be at least 1");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                self.logging.level
            );
        }
        Ok(())
    }
}
