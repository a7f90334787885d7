use super::http::send_with_retry;
use super::{import_endpoint, payload_hostname, MetricSink, SinkError};
use async_trait::async_trait;
use fleetmon_common::proto::metric::MetricsPayload;

pub struct CpuSink {
    client: reqwest::Client,
    endpoint: String,
}

impl CpuSink {
    pub fn new(client: reqwest::Client, vm_endpoint: &str) -> Self {
        Self {
            client,
            endpoint: import_endpoint(vm_endpoint),
        }
    }
}

#[async_trait]
impl MetricSink for CpuSink {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn format(&self, payload: &MetricsPayload, timestamp_ms: i64) -> Vec<String> {
        let host = payload_hostname(payload);
        let mut lines = Vec::new();

        for cpu in &payload.cpu {
            if cpu.is_total {
                lines.push(format!(
                    "cpu_usage_percent_avg{{host=\"{host}\"}} {:.6} {timestamp_ms}\n",
                    cpu.usage_percent,
                ));
            } else {
                lines.push(format!(
                    "cpu_usage_percent{{host=\"{host}\",model=\"{}\",core_id=\"{}\"}} {:.6} {timestamp_ms}\n",
                    cpu.model, cpu.core_id, cpu.usage_percent,
                ));
                lines.push(format!(
                    "cpu_user_time{{host=\"{host}\",model=\"{}\",core_id=\"{}\"}} {:.6} {timestamp_ms}\n",
                    cpu.model, cpu.core_id, cpu.user_time,
                ));
                lines.push(format!(
                    "cpu_system_time{{host=\"{host}\",model=\"{}\",core_id=\"{}\"}} {:.6} {timestamp_ms}\n",
                    cpu.model, cpu.core_id, cpu.system_time,
                ));
                lines.push(format!(
                    "cpu_idle_time{{host=\"{host}\",model=\"{}\",core_id=\"{}\"}} {:.6} {timestamp_ms}\n",
                    cpu.model, cpu.core_id, cpu.idle_time,
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
        send_with_retry(&self.client, &self.endpoint, lines.concat(), "cpu").await?;
        tracing::debug!(metrics_count = count, "cpu metrics stored");
        Ok(())
    }
}
