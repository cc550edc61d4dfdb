//! Switchyard binary entry point.
//!
//! Runs the socket server with the built-in diagnostics channel or, with
//! `--connect`, a reconnecting client against another server.

mod channels;
mod cli;
mod config;
mod logging;
mod signals;

use anyhow::{Context, Result};
use cli::CliArgs;
use config::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use switchyard_events::Envelope;
use switchyard_server::{ClientWorker, SocketServer};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    config
        .validate()
        .context("Configuration validation failed")?;
    logging::setup_logging(&config.logging, args.json_logs)?;

    match args.connect.as_deref() {
        Some(url) => run_client(&config, url, args.invite_token.as_deref()).await,
        None => run_server(&config).await,
    }
}

async fn run_server(config: &AppConfig) -> Result<()> {
    let server_config = config.to_server_config()?;
    info!("🚀 Switchyard v{}", env!("CARGO_PKG_VERSION"));
    info!("📋 Configuration Summary:");
    info!("  🌐 Bind address: {}", server_config.bind_address);
    info!("  🔗 Endpoint: {}", server_config.endpoint_path);
    info!("  🧩 Connections per shard: {}", server_config.max_connections_per_shard);
    info!("  🎟️ Invite TTL: {:?}", server_config.invite_ttl);
    info!("  🛠️ Admin routes: {}", server_config.admin_routes);

    let dispatcher = channels::server_dispatcher()?;
    let server = SocketServer::new(server_config, dispatcher);
    let listener = server.bind().await?;

    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    let shutdown = server.shutdown_token();
    let cause = signals::wait_for_stop(signals::wait_for_shutdown(), &shutdown)
        .await
        .context("Failed to install signal handlers")?;
    if cause == signals::StopCause::Signal {
        info!("🛑 Shutdown signal received, stopping server");
        server.stop().await;
    }

    match serving.await {
        Ok(Ok(())) => {
            info!("✅ Server stopped cleanly");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("❌ Server error: {}", e);
            Err(e.into())
        }
        Err(e) => Err(e).context("Server task panicked"),
    }
}

async fn run_client(config: &AppConfig, url: &str, token: Option<&str>) -> Result<()> {
    let client_config = config.to_client_config(Some(url), token);
    let heartbeat = config.client.clone().unwrap_or_default().heartbeat_secs;

    let worker = ClientWorker::new(client_config, channels::client_dispatcher()?);
    worker.start();

    let pinger = (heartbeat > 0).then(|| tokio::spawn(heartbeat_loop(worker.clone(), Duration::from_secs(heartbeat))));

    signals::wait_for_shutdown()
        .await
        .context("Failed to install signal handlers")?;
    info!("🛑 Shutdown signal received, stopping client");

    if let Some(pinger) = pinger {
        pinger.abort();
    }
    worker.stop().await;
    Ok(())
}

async fn heartbeat_loop(worker: Arc<ClientWorker>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        if !worker.is_connected() {
            continue;
        }
        if let Err(e) = worker.send(&Envelope::new("ping")) {
            debug!("Heartbeat not sent: {}", e);
        }
    }
}
