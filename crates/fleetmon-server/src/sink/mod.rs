//! Per-family sinks and the parallel fan-out that feeds them.
//!
//! Each sink renders its slice of a payload into TSDB line protocol and
//! posts it downstream. The fan-out never fails the caller: losing one
//! family's downstream must not drop the other families, and the line
//! protocol is idempotent for identical timestamp and labels.

mod cpu;
mod disk;
mod docker;
mod http;
mod network;
mod ram;

pub use cpu::CpuSink;
pub use disk::DiskSink;
pub use docker::DockerSink;
pub use network::NetworkSink;
pub use ram::RamSink;

use async_trait::async_trait;
use fleetmon_common::proto::metric::MetricsPayload;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("failed to send {family} metrics after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        family: &'static str,
        attempts: u32,
        last_error: String,
    },
}

#[async_trait]
pub trait MetricSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render this family's slice of the payload into protocol lines.
    fn format(&self, payload: &MetricsPayload, timestamp_ms: i64) -> Vec<String>;

    /// Ship rendered lines downstream. Empty input is a successful no-op.
    async fn store(&self, lines: Vec<String>) -> Result<(), SinkError>;
}

pub struct SinkManager {
    sinks: Vec<Arc<dyn MetricSink>>,
}

impl SinkManager {
    pub fn new(vm_endpoint: &str) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .read_timeout(HTTP_READ_TIMEOUT)
            .build()?;

        Ok(Self {
            sinks: vec![
                Arc::new(CpuSink::new(client.clone(), vm_endpoint)),
                Arc::new(RamSink::new(client.clone(), vm_endpoint)),
                Arc::new(DiskSink::new(client.clone(), vm_endpoint)),
                Arc::new(NetworkSink::new(client.clone(), vm_endpoint)),
                Arc::new(DockerSink::new(client, vm_endpoint)),
            ],
        })
    }

    /// Assemble a manager over arbitrary sinks.
    pub fn with_sinks(sinks: Vec<Arc<dyn MetricSink>>) -> Self {
        Self { sinks }
    }

    /// Fan one payload out to every sink in parallel. Individual sink
    /// failures are logged and swallowed; the payload as a whole counts as
    /// stored as long as the fan-out ran.
    pub async fn store_all(&self, payload: &MetricsPayload) -> Result<(), SinkError> {
        let timestamp_ms = payload
            .timestamp
            .as_ref()
            .map(fleetmon_common::timestamp_millis)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let mut tasks = JoinSet::new();
        for sink in &self.sinks {
            let sink = sink.clone();
            let payload = payload.clone();
            tasks.spawn(async move {
                let lines = sink.format(&payload, timestamp_ms);
                (sink.name(), sink.store(lines).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(e))) => {
                    tracing::error!(sink = name, error = %e, "failed to store metrics");
                }
                Err(e) => {
                    tracing::error!(error = %e, "sink task failed");
                }
            }
        }

        Ok(())
    }
}

pub(crate) fn import_endpoint(vm_endpoint: &str) -> String {
    format!(
        "{}/api/v1/import/prometheus",
        vm_endpoint.trim_end_matches('/')
    )
}

pub(crate) fn payload_hostname(payload: &MetricsPayload) -> &str {
    payload
        .host
        .as_ref()
        .map(|host| host.hostname.as_str())
        .unwrap_or("")
}
