use super::http::send_with_retry;
use super::{import_endpoint, payload_hostname, MetricSink, SinkError};
use async_trait::async_trait;
use fleetmon_common::proto::metric::MetricsPayload;

pub struct RamSink {
    client: reqwest::Client,
    endpoint: String,
}

impl RamSink {
    pub fn new(client: reqwest::Client, vm_endpoint: &str) -> Self {
        Self {
            client,
            endpoint: import_endpoint(vm_endpoint),
        }
    }
}

#[async_trait]
impl MetricSink for RamSink {
    fn name(&self) -> &'static str {
        "ram"
    }

    fn format(&self, payload: &MetricsPayload, timestamp_ms: i64) -> Vec<String> {
        let Some(ram) = payload.ram.as_ref() else {
            return Vec::new();
        };
        let host = payload_hostname(payload);

        vec![
            format!(
                "ram_total_octets{{host=\"{host}\"}} {} {timestamp_ms}\n",
                ram.total_octets,
            ),
            format!(
                "ram_used_octets{{host=\"{host}\"}} {} {timestamp_ms}\n",
                ram.used_octets,
            ),
            format!(
                "ram_used_percent{{host=\"{host}\"}} {:.6} {timestamp_ms}\n",
                ram.used_percent,
            ),
        ]
    }

    async fn store(&self, lines: Vec<String>) -> Result<(), SinkError> {
        if lines.is_empty() {
            return Ok(());
        }
        let count = lines.len();
        send_with_retry(&self.client, &self.endpoint, lines.concat(), "ram").await?;
        tracing::debug!(metrics_count = count, "ram metrics stored");
        Ok(())
    }
}
