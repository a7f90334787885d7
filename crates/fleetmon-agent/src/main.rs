use anyhow::{anyhow, Result};
use clap::Parser;
use fleetmon_agent::config::{AgentConfig, Cli};
use fleetmon_agent::health::HealthMonitor;
use fleetmon_agent::orchestrator::{Orchestrator, Sources};
use fleetmon_agent::stream::StreamManager;
use fleetmon_common::logging;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = cli.log_format.parse().map_err(|e: String| anyhow!(e))?;
    logging::init(&cli.log_level, format, "fleetmon_agent").map_err(|e| anyhow!(e))?;

    let config = AgentConfig::from_cli(&cli)?;
    tracing::info!(
        server = %config.endpoint,
        collection_interval_secs = config.collection_interval_secs,
        health_interval_secs = config.health_check_interval_secs,
        "agent starting"
    );

    let cancel = CancellationToken::new();

    let hostname = fleetmon_collector::host::hostname();
    let health = Arc::new(HealthMonitor::new(
        config.endpoint.clone(),
        config.token.clone(),
        hostname,
        Duration::from_secs(config.health_check_interval_secs),
    ));
    let stream = Arc::new(StreamManager::new(
        config.endpoint.clone(),
        config.token.clone(),
        health.clone(),
    ));

    let health_task = {
        let health = health.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { health.run(cancel).await })
    };

    let orchestrator = Orchestrator::new(
        Sources::init(),
        stream,
        health,
        Duration::from_secs(config.collection_interval_secs),
    );
    let collect_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.run(cancel).await })
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("failed to listen for shutdown signal: {e}"))?;
    tracing::info!("shutting down");
    cancel.cancel();

    let _ = collect_task.await;
    let _ = health_task.await;

    Ok(())
}
