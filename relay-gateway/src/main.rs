//! Relay Gateway - Main entry point.

use anyhow::Result;
use relay_common::config::Config;
use relay_common::logging::{init_logging, with_bootstrap_logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Config loading logs before the configured subscriber exists
    let config = with_bootstrap_logging(Config::load_and_validate)?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Relay Gateway v{}", env!("CARGO_PKG_VERSION"));

    relay_gateway::start_server(&config).await
}
