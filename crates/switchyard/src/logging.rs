//! Logging system setup.
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` overrides the
//! configured level when it is set.

use crate::config::LoggingSettings;
use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system.
///
/// # Arguments
/// * `settings` - Level and format from the configuration file
/// * `json_override` - Forces JSON output regardless of `settings`
///
/// # Environment Variables
/// * `RUST_LOG` - Override the configured filter (e.g., "switchyard_server=trace")
pub fn setup_logging(settings: &LoggingSettings, json_override: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json_override || settings.json_format {
        registry
            .with(fmt::layer().json().with_target(false).with_thread_ids(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .try_init()
    };
    installed.map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    info!("🔧 Logging initialized with level: {}", settings.level);
    Ok(())
}
