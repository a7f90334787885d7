use super::http::send_with_retry;
use super::{import_endpoint, payload_hostname, MetricSink, SinkError};
use async_trait::async_trait;
use fleetmon_common::proto::metric::MetricsPayload;

pub struct DiskSink {
    client: reqwest::Client,
    endpoint: String,
}

impl DiskSink {
    pub fn new(client: reqwest::Client, vm_endpoint: &str) -> Self {
        Self {
            client,
            endpoint: import_endpoint(vm_endpoint),
        }
    }
}

#[async_trait]
impl MetricSink for DiskSink {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn format(&self, payload: &MetricsPayload, timestamp_ms: i64) -> Vec<String> {
        let host = payload_hostname(payload);
        let mut lines = Vec::new();

        for disk in &payload.disk {
            let labels = format!(
                "host=\"{host}\",device=\"{}\",path=\"{}\",fstype=\"{}\"",
                disk.device, disk.path, disk.fstype,
            );
            lines.push(format!(
                "disk_total{{{labels}}} {} {timestamp_ms}\n",
                disk.total,
            ));
            lines.push(format!(
                "disk_used{{{labels}}} {} {timestamp_ms}\n",
                disk.used,
            ));
            lines.push(format!(
                "disk_used_percent{{{labels}}} {:.6} {timestamp_ms}\n",
                disk.used_percent,
            ));
        }

        lines
    }

    async fn store(&self, lines: Vec<String>) -> Result<(), SinkError> {
        if lines.is_empty() {
            return Ok(());
        }
        let count = lines.len();
        send_with_retry(&self.client, &self.endpoint, lines.concat(), "disk").await?;
        tracing::debug!(metrics_count = count, "disk metrics stored");
        Ok(())
    }
}
