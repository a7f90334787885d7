use anyhow::{anyhow, Result};
use clap::Parser;
use fleetmon_common::logging;
use fleetmon_server::config::{Cli, ServerConfig};
use fleetmon_server::server::Server;
use std::time::Duration;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = cli.log_format.parse().map_err(|e: String| anyhow!(e))?;
    logging::init(&cli.log_level, format, "fleetmon_server").map_err(|e| anyhow!(e))?;

    let config = ServerConfig::from_cli(&cli)?;
    tracing::info!(
        grpc_addr = %config.grpc_addr,
        vm_endpoint = %config.vm_endpoint,
        dsn_configured = config.dsn.is_some(),
        "server starting"
    );

    let mut server = Server::new(config)?;
    server.start().await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("failed to listen for shutdown signal: {e}"))?;
    tracing::info!("received shutdown signal");

    server.stop(SHUTDOWN_TIMEOUT).await?;
    tracing::info!("server stopped successfully");
    Ok(())
}
