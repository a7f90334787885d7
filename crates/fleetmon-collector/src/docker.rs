use anyhow::{anyhow, Context, Result};
use bollard::container::{ListContainersOptions, Stats, StatsOptions};
use bollard::models::ContainerSummary;
use bollard::Docker;
use fleetmon_common::types::{
    CpuMetrics, DiskMetrics, DockerMetrics, NetworkMetrics, RamMetrics,
};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::Instant;

/// Ceiling for one tick's container list plus stats fan-out.
const COLLECT_TIMEOUT: Duration = Duration::from_secs(10);

const MIN_WORKERS: usize = 1;
const MAX_WORKERS: usize = 8;
const CONTAINERS_PER_WORKER: usize = 3;

pub struct DockerCollector {
    client: Docker,
}

impl DockerCollector {
    /// Fails when no Docker endpoint is configured; an unreachable daemon
    /// surfaces later, per tick, as a collect error.
    pub fn new() -> Result<Self> {
        let client = Docker::connect_with_local_defaults()
            .context("failed to create docker client")?;
        Ok(Self { client })
    }

    pub async fn collect(&self) -> Result<Vec<DockerMetrics>> {
        let deadline = Instant::now() + COLLECT_TIMEOUT;

        let containers = tokio::time::timeout_at(
            deadline,
            self.client
                .list_containers(Some(ListContainersOptions::<String>::default())),
        )
        .await
        .map_err(|_| anyhow!("timed out listing containers"))?
        .context("failed to list containers")?;

        if containers.is_empty() {
            return Ok(Vec::new());
        }

        let workers = optimal_workers(containers.len());
        tracing::debug!(
            containers = containers.len(),
            workers,
            "starting container metrics collection"
        );

        let results: Vec<(String, Result<DockerMetrics>)> =
            futures_util::stream::iter(containers.into_iter().map(|summary| {
                let short = short_id(&summary);
                async move { (short, self.process_container(summary, deadline).await) }
            }))
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut metrics = Vec::with_capacity(results.len());
        let mut error_count = 0usize;
        for (container_id, result) in results {
            match result {
                Ok(m) => metrics.push(m),
                Err(e) => {
                    error_count += 1;
                    tracing::debug!(
                        container_id = %container_id,
                        error = %e,
                        "failed to collect container metrics"
                    );
                }
            }
        }

        if error_count > 0 {
            tracing::warn!(
                errors = error_count,
                successful = metrics.len(),
                "some container metrics collection failed"
            );
        }

        Ok(metrics)
    }

    async fn process_container(
        &self,
        summary: ContainerSummary,
        deadline: Instant,
    ) -> Result<DockerMetrics> {
        let id = summary.id.clone().unwrap_or_default();
        if id.is_empty() {
            return Err(anyhow!("container without id"));
        }

        let stats = self.container_stats(&id, deadline).await?;

        let image = summary.image.clone().unwrap_or_default();
        let (image_name, image_tag) = parse_image_reference(&image);
        let container_name = summary
            .names
            .as_ref()
            .and_then(|names| names.first())
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_default();

        Ok(DockerMetrics {
            container_id: id,
            container_name,
            image,
            image_id: summary.image_id.clone().unwrap_or_default(),
            image_name,
            image_tag,
            cpu_metrics: build_cpu_metrics(&stats),
            ram_metrics: build_ram_metrics(&stats),
            disk_metrics: build_disk_metrics(&stats),
            network_metrics: build_network_metrics(&stats),
        })
    }

    async fn container_stats(&self, id: &str, deadline: Instant) -> Result<Stats> {
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let mut stream = std::pin::pin!(self.client.stats(id, Some(options)));
        let stats = tokio::time::timeout_at(deadline, stream.next())
            .await
            .map_err(|_| anyhow!("timed out collecting stats"))?
            .ok_or_else(|| anyhow!("empty stats response"))?
            .context("failed to get container stats")?;
        Ok(stats)
    }
}

fn short_id(summary: &ContainerSummary) -> String {
    let id = summary.id.as_deref().unwrap_or("");
    id.get(..12).unwrap_or(id).to_string()
}

fn optimal_workers(container_count: usize) -> usize {
    if container_count == 0 {
        return MIN_WORKERS;
    }
    container_count
        .div_ceil(CONTAINERS_PER_WORKER)
        .clamp(MIN_WORKERS, MAX_WORKERS)
}

fn build_cpu_metrics(stats: &Stats) -> CpuMetrics {
    CpuMetrics {
        usage_percent: cpu_usage_percent(stats),
        user_time: stats.cpu_stats.cpu_usage.usage_in_usermode as f64,
        system_time: stats.cpu_stats.cpu_usage.usage_in_kernelmode as f64,
        cores: stats.cpu_stats.online_cpus.unwrap_or(0) as i32,
        threads: stats.cpu_stats.cpu_usage.total_usage as i32,
        ..Default::default()
    }
}

fn cpu_usage_percent(stats: &Stats) -> f64 {
    let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as f64
        - stats.precpu_stats.cpu_usage.total_usage as f64;
    let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
        - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;
    let percpu_len = stats
        .cpu_stats
        .cpu_usage
        .percpu_usage
        .as_ref()
        .map_or(0, Vec::len);

    derive_cpu_percent(
        cpu_delta,
        system_delta,
        stats.cpu_stats.online_cpus.unwrap_or(0),
        percpu_len,
    )
}

/// `(dcpu/dsystem) * cpu_count * 100`, clamped to [0,100]. Zero when the
/// system counter made no progress or the cpu counter went backwards.
/// `cpu_count` falls back to the per-cpu slice length, then to 1.
fn derive_cpu_percent(
    cpu_delta: f64,
    system_delta: f64,
    online_cpus: u64,
    percpu_len: usize,
) -> f64 {
    if system_delta <= 0.0 || cpu_delta < 0.0 {
        return 0.0;
    }

    let num_cpus = if online_cpus > 0 {
        online_cpus as f64
    } else if percpu_len > 0 {
        percpu_len as f64
    } else {
        1.0
    };

    ((cpu_delta / system_delta) * num_cpus * 100.0).clamp(0.0, 100.0)
}

fn build_ram_metrics(stats: &Stats) -> RamMetrics {
    let usage = stats.memory_stats.usage.unwrap_or(0);
    let limit = stats.memory_stats.limit.unwrap_or(0);

    RamMetrics {
        total_octets: limit,
        used_octets: usage,
        available_octets: limit.saturating_sub(usage),
        used_percent: memory_percent(usage, limit),
        ..Default::default()
    }
}

fn memory_percent(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    ((used as f64 / limit as f64) * 100.0).min(100.0)
}

fn build_disk_metrics(stats: &Stats) -> DiskMetrics {
    let mut metric = DiskMetrics {
        path: "/".to_string(),
        ..Default::default()
    };

    if let Some(entries) = &stats.blkio_stats.io_service_bytes_recursive {
        for entry in entries {
            if entry.op.eq_ignore_ascii_case("read") {
                metric.read_octets += entry.value;
            } else if entry.op.eq_ignore_ascii_case("write") {
                metric.write_octets += entry.value;
            }
        }
    }

    if let Some(entries) = &stats.blkio_stats.io_serviced_recursive {
        for entry in entries {
            if entry.op.eq_ignore_ascii_case("read") {
                metric.read_count += entry.value;
            } else if entry.op.eq_ignore_ascii_case("write") {
                metric.write_count += entry.value;
            }
        }
    }

    metric
}

fn build_network_metrics(stats: &Stats) -> NetworkMetrics {
    let mut metric = NetworkMetrics::default();
    if let Some(networks) = &stats.networks {
        for network in networks.values() {
            metric.bytes_recv += network.rx_bytes;
            metric.bytes_sent += network.tx_bytes;
            metric.packets_recv += network.rx_packets;
            metric.packets_sent += network.tx_packets;
            metric.err_in += network.rx_errors;
            metric.err_out += network.tx_errors;
        }
    }
    metric
}

/// Split an image reference on the rightmost colon so registries carrying a
/// port number keep the whole repository path in the name.
fn parse_image_reference(image: &str) -> (String, String) {
    match image.rfind(':') {
        Some(idx) => (image[..idx].to_string(), image[idx + 1..].to_string()),
        None => (image.to_string(), "latest".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_reference_splits_on_rightmost_colon() {
        assert_eq!(
            parse_image_reference("nginx:1.25"),
            ("nginx".to_string(), "1.25".to_string())
        );
        assert_eq!(
            parse_image_reference("a:b:c"),
            ("a:b".to_string(), "c".to_string())
        );
        assert_eq!(
            parse_image_reference("registry:5000/img:v1"),
            ("registry:5000/img".to_string(), "v1".to_string())
        );
    }

    #[test]
    fn image_reference_without_tag_defaults_to_latest() {
        assert_eq!(
            parse_image_reference("nginx"),
            ("nginx".to_string(), "latest".to_string())
        );
    }

    #[test]
    fn cpu_percent_is_zero_for_non_positive_system_delta() {
        assert_eq!(derive_cpu_percent(100.0, 0.0, 4, 4), 0.0);
        assert_eq!(derive_cpu_percent(100.0, -50.0, 4, 4), 0.0);
    }

    #[test]
    fn cpu_percent_is_zero_for_negative_cpu_delta() {
        assert_eq!(derive_cpu_percent(-1.0, 1000.0, 4, 4), 0.0);
    }

    #[test]
    fn cpu_percent_scales_by_cpu_count_and_clamps() {
        // 10% of system time on 2 cpus
        assert!((derive_cpu_percent(100.0, 1000.0, 2, 0) - 20.0).abs() < 1e-9);
        // would be 400%, clamped
        assert_eq!(derive_cpu_percent(2000.0, 1000.0, 2, 0), 100.0);
    }

    #[test]
    fn cpu_count_falls_back_to_percpu_length_then_one() {
        assert!((derive_cpu_percent(100.0, 1000.0, 0, 4) - 40.0).abs() < 1e-9);
        assert!((derive_cpu_percent(100.0, 1000.0, 0, 0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn memory_percent_handles_zero_limit_and_clamps() {
        assert_eq!(memory_percent(512, 0), 0.0);
        assert!((memory_percent(512, 2048) - 25.0).abs() < 1e-9);
        assert_eq!(memory_percent(4096, 2048), 100.0);
    }

    #[test]
    fn worker_count_is_clamped_between_one_and_eight() {
        assert_eq!(optimal_workers(0), 1);
        assert_eq!(optimal_workers(1), 1);
        assert_eq!(optimal_workers(3), 1);
        assert_eq!(optimal_workers(4), 2);
        assert_eq!(optimal_workers(9), 3);
        assert_eq!(optimal_workers(24), 8);
        assert_eq!(optimal_workers(500), 8);
    }
}
