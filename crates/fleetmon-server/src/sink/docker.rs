use super::http::send_with_retry;
use super::{import_endpoint, payload_hostname, MetricSink, SinkError};
use async_trait::async_trait;
use fleetmon_common::proto::metric::MetricsPayload;

pub struct DockerSink {
    client: reqwest::Client,
    endpoint: String,
}

impl DockerSink {
    pub fn new(client: reqwest::Client, vm_endpoint: &str) -> Self {
        Self {
            client,
            endpoint: import_endpoint(vm_endpoint),
        }
    }
}

#[async_trait]
impl MetricSink for DockerSink {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn format(&self, payload: &MetricsPayload, timestamp_ms: i64) -> Vec<String> {
        let host = payload_hostname(payload);
        let mut lines = Vec::new();

        for container in &payload.docker {
            let labels = format!(
                "host=\"{host}\",container_id=\"{}\",container_name=\"{}\",image=\"{}\"",
                container.container_id, container.container_name, container.image,
            );
            if let Some(cpu) = container.cpu_metrics.as_ref() {
                lines.push(format!(
                    "docker_cpu_usage_percent{{{labels}}} {:.6} {timestamp_ms}\n",
                    cpu.usage_percent,
                ));
            }
            if let Some(ram) = container.ram_metrics.as_ref() {
                lines.push(format!(
                    "docker_memory_used_percent{{{labels}}} {:.6} {timestamp_ms}\n",
                    ram.used_percent,
                ));
            }
            if let Some(network) = container.network_metrics.as_ref() {
                lines.push(format!(
                    "docker_network_bytes_sent{{{labels}}} {} {timestamp_ms}\n",
                    network.bytes_sent,
                ));
            }
        }

        lines
    }

    async fn store(&self, lines: Vec<String>) -> Result<(), SinkError> {
        if lines.is_empty() {
            return Ok(());
        }
        let count = lines.len();
        send_with_retry(&self.client, &self.endpoint, lines.concat(), "docker").await?;
        tracing::debug!(metrics_count = count, "docker metrics stored");
        Ok(())
    }
}
