use anyhow::{anyhow, Result};
use clap::Parser;
use std::net::SocketAddr;

#[derive(Debug, Parser)]
#[command(name = "fleetmon-server", about = "fleetmon central metrics server")]
pub struct Cli {
    /// gRPC listen address
    #[arg(long = "grpc-addr", default_value = ":9090")]
    pub grpc_addr: String,

    /// VictoriaMetrics endpoint metrics are forwarded to
    #[arg(long = "vm-endpoint", default_value = "http://localhost:8428")]
    pub vm_endpoint: String,

    /// Connection string for the operator account store
    #[arg(long)]
    pub dsn: Option<String>,

    /// Secret for signing access tokens
    #[arg(long = "jwt-secret")]
    pub jwt_secret: Option<String>,

    /// Secret for signing refresh tokens
    #[arg(long = "jwt-refresh-secret")]
    pub jwt_refresh_secret: Option<String>,

    /// Log level: debug, info, warn, error
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format: json or console
    #[arg(long, default_value = "json")]
    pub log_format: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub grpc_addr: SocketAddr,
    pub vm_endpoint: String,
    pub dsn: Option<String>,
    pub jwt_secret: Option<String>,
    pub jwt_refresh_secret: Option<String>,
}

impl ServerConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        Ok(Self {
            grpc_addr: parse_listen_addr(&cli.grpc_addr)?,
            vm_endpoint: normalize_vm_endpoint(&cli.vm_endpoint)?,
            dsn: cli.dsn.clone(),
            jwt_secret: cli.jwt_secret.clone(),
            jwt_refresh_secret: cli.jwt_refresh_secret.clone(),
        })
    }
}

/// A bare `:port` binds all interfaces, matching the common listen-address
/// shorthand.
fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(anyhow!("grpc address cannot be empty"));
    }
    let candidate = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    candidate
        .parse()
        .map_err(|e| anyhow!("invalid grpc address '{addr}': {e}"))
}

fn normalize_vm_endpoint(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() {
        return Err(anyhow!("vm endpoint cannot be empty"));
    }
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(anyhow!(
            "vm endpoint must use http or https scheme: {endpoint}"
        ));
    }
    Ok(endpoint.to_string())
}
