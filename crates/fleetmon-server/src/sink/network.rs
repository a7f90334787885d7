use super::http::send_with_retry;
use super::{import_endpoint, payload_hostname, MetricSink, SinkError};
use async_trait::async_trait;
use fleetmon_common::proto::metric::MetricsPayload;

pub struct NetworkSink {
    client: reqwest::Client,
    endpoint: String,
}

impl NetworkSink {
    pub fn new(client: reqwest::Client, vm_endpoint: &str) -> Self {
        Self {
            client,
            endpoint: import_endpoint(vm_endpoint),
        }
    }
}

#[async_trait]
impl MetricSink for NetworkSink {
    fn name(&self) -> &'static str {
        "network"
    }

    fn format(&self, payload: &MetricsPayload, timestamp_ms: i64) -> Vec<String> {
        let host = payload_hostname(payload);
        let mut lines = Vec::new();

        for net in &payload.network {
            let labels = format!("host=\"{host}\",interface=\"{}\"", net.interface_name);
            lines.push(format!(
                "network_bytes_sent{{{labels}}} {} {timestamp_ms}\n",
                net.bytes_sent,
            ));
            lines.push(format!(
                "network_bytes_recv{{{labels}}} {} {timestamp_ms}\n",
                net.bytes_recv,
            ));
            lines.push(format!(
                "network_packets_sent{{{labels}}} {} {timestamp_ms}\n",
                net.packets_sent,
            ));
            lines.push(format!(
                "network_packets_recv{{{labels}}} {} {timestamp_ms}\n",
                net.packets_recv,
            ));
        }

        lines
    }

    async fn store(&self, lines: Vec<String>) -> Result<(), SinkError> {
        if lines.is_empty() {
            return Ok(());
        }
        let count = lines.len();
        send_with_retry(&self.client, &self.endpoint, lines.concat(), "network").await?;
        tracing::debug!(metrics_count = count, "network metrics stored");
        Ok(())
    }
}
