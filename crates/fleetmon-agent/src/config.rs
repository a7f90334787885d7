use anyhow::{anyhow, Result};
use clap::Parser;

const DEFAULT_COLLECTION_INTERVAL: u64 = 180;
const DEFAULT_HEALTH_CHECK_INTERVAL: u64 = 30;

#[derive(Debug, Parser)]
#[command(name = "fleetmon-agent", about = "fleetmon host telemetry agent")]
pub struct Cli {
    /// Server gRPC address to stream metrics to (required)
    #[arg(long = "grpc-addr", short = 's')]
    pub grpc_addr: String,

    /// API token for authentication (required)
    #[arg(long, short = 't')]
    pub token: String,

    /// Collection interval in seconds
    #[arg(long, short = 'i', default_value_t = DEFAULT_COLLECTION_INTERVAL)]
    pub interval: u64,

    /// Health check interval in seconds
    #[arg(long, default_value_t = DEFAULT_HEALTH_CHECK_INTERVAL)]
    pub health_check_interval: u64,

    /// Log level: debug, info, warn, error
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format: json or console
    #[arg(long, default_value = "json")]
    pub log_format: String,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub endpoint: String,
    pub token: String,
    pub collection_interval_secs: u64,
    pub health_check_interval_secs: u64,
}

impl AgentConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        if cli.interval == 0 {
            return Err(anyhow!("collection interval must be at least 1 second"));
        }
        if cli.health_check_interval == 0 {
            return Err(anyhow!("health check interval must be at least 1 second"));
        }
        Ok(Self {
            endpoint: normalize_endpoint(&cli.grpc_addr)?,
            token: cli.token.clone(),
            collection_interval_secs: cli.interval,
            health_check_interval_secs: cli.health_check_interval,
        })
    }
}

/// Accepts `host:port` or a full http/https URL; returns a canonical URL
/// without a trailing slash for the tonic endpoint.
fn normalize_endpoint(addr: &str) -> Result<String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(anyhow!("server address cannot be empty"));
    }

    let candidate = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    };

    let parsed =
        url::Url::parse(&candidate).map_err(|e| anyhow!("invalid server address: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(anyhow!(
                "server address must use http or https scheme, got: {other}"
            ))
        }
    }
    if parsed.host_str().is_none() {
        return Err(anyhow!("server address must have a valid host"));
    }

    Ok(candidate.trim_end_matches('/').to_string())
}
