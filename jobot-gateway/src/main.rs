//! Jobot Gateway - Main entry point.

use anyhow::{Context, Result};
use jobot_common::config::Config;
use jobot_common::config_loader::check_modular_files;
use jobot_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.observability.log_level, &config.observability.log_format);

    tracing::info!("Jobot Gateway v{}", env!("CARGO_PKG_VERSION"));
    for (file, found) in check_modular_files(None) {
        tracing::debug!(file = %file, found, "Config file");
    }

    config.validate_gateway()?;

    jobot_gateway::start_server(&config).await
}
