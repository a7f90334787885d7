//! Collection orchestrator: every tick, sample all sources in parallel,
//! assemble the payload and hand it to the stream manager.

use crate::health::HealthMonitor;
use crate::stream::{SendOutcome, StreamManager};
use chrono::Utc;
use fleetmon_collector::cpu::CpuCollector;
use fleetmon_collector::disk::DiskCollector;
use fleetmon_collector::docker::DockerCollector;
use fleetmon_collector::host::HostCollector;
use fleetmon_collector::network::NetworkCollector;
use fleetmon_collector::ram::RamCollector;
use fleetmon_common::convert;
use fleetmon_common::types::{
    CpuMetrics, DiskMetrics, DockerMetrics, HostMetrics, MetricsPayload, NetworkMetrics,
    RamMetrics,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct Sources {
    pub cpu: Arc<CpuCollector>,
    pub ram: Arc<RamCollector>,
    pub disk: Arc<DiskCollector>,
    pub network: Arc<NetworkCollector>,
    pub host: Arc<HostCollector>,
    pub docker: Option<Arc<DockerCollector>>,
}

impl Sources {
    /// Container collection is optional: a host without a Docker endpoint
    /// simply omits that family from every payload.
    pub fn init() -> Self {
        let docker = match DockerCollector::new() {
            Ok(collector) => Some(Arc::new(collector)),
            Err(e) => {
                tracing::debug!(error = %e, "docker collector unavailable");
                None
            }
        };

        Self {
            cpu: Arc::new(CpuCollector::new()),
            ram: Arc::new(RamCollector::new()),
            disk: Arc::new(DiskCollector::new()),
            network: Arc::new(NetworkCollector::new()),
            host: Arc::new(HostCollector::new()),
            docker,
        }
    }
}

#[derive(Default)]
struct CollectionResult {
    cpu: Vec<CpuMetrics>,
    ram: RamMetrics,
    disk: Vec<DiskMetrics>,
    network: Vec<NetworkMetrics>,
    host: HostMetrics,
    docker: Vec<DockerMetrics>,
    errors: Vec<String>,
}

pub struct Orchestrator {
    sources: Sources,
    stream: Arc<StreamManager>,
    health: Arc<HealthMonitor>,
    interval: Duration,
}

impl Orchestrator {
    pub fn new(
        sources: Sources,
        stream: Arc<StreamManager>,
        health: Arc<HealthMonitor>,
        interval: Duration,
    ) -> Self {
        Self {
            sources,
            stream,
            health,
            interval,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "starting collection loop"
        );
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; skip it so the agent
        // samples on the configured cadence from startup.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.stream.close().await;
                    tracing::info!("collection loop stopped");
                    return;
                }
                _ = tick.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        if !self.health.is_healthy() {
            tracing::debug!("skipping collection tick, server unhealthy");
            return;
        }

        let result = self.collect_all().await;
        if !result.errors.is_empty() {
            tracing::warn!(errors = ?result.errors, "errors during metrics collection");
        }

        let payload = MetricsPayload {
            host: result.host,
            cpu: result.cpu,
            ram: result.ram,
            disk: result.disk,
            network: result.network,
            docker: result.docker,
            timestamp: Utc::now(),
        };

        match self.stream.send(convert::payload_to_proto(&payload)).await {
            SendOutcome::Delivered => {
                tracing::debug!(hostname = %payload.host.hostname, "payload delivered");
            }
            SendOutcome::Skipped => {
                tracing::debug!("payload skipped, server unhealthy");
            }
            SendOutcome::StreamBroken => {
                tracing::debug!("payload dropped, stream unavailable");
            }
        }
    }

    async fn collect_all(&self) -> CollectionResult {
        let result = Arc::new(Mutex::new(CollectionResult::default()));
        let mut tasks = JoinSet::new();

        {
            let cpu = self.sources.cpu.clone();
            let result = result.clone();
            tasks.spawn(async move {
                match cpu.collect().await {
                    Ok(metrics) => result.lock().unwrap().cpu = metrics,
                    Err(e) => record_error(&result, "cpu", &e),
                }
            });
        }
        {
            let ram = self.sources.ram.clone();
            let result = result.clone();
            tasks.spawn(async move {
                match ram.collect().await {
                    Ok(metrics) => result.lock().unwrap().ram = metrics,
                    Err(e) => record_error(&result, "ram", &e),
                }
            });
        }
        {
            let disk = self.sources.disk.clone();
            let result = result.clone();
            tasks.spawn(async move {
                match disk.collect().await {
                    Ok(metrics) => result.lock().unwrap().disk = metrics,
                    Err(e) => record_error(&result, "disk", &e),
                }
            });
        }
        {
            let network = self.sources.network.clone();
            let result = result.clone();
            tasks.spawn(async move {
                match network.collect().await {
                    Ok(metrics) => result.lock().unwrap().network = metrics,
                    Err(e) => record_error(&result, "network", &e),
                }
            });
        }
        {
            let host = self.sources.host.clone();
            let result = result.clone();
            tasks.spawn(async move {
                match host.collect().await {
                    Ok(metrics) => result.lock().unwrap().host = metrics,
                    Err(e) => record_error(&result, "host", &e),
                }
            });
        }
        if let Some(docker) = &self.sources.docker {
            let docker = docker.clone();
            let result = result.clone();
            tasks.spawn(async move {
                match docker.collect().await {
                    Ok(metrics) => result.lock().unwrap().docker = metrics,
                    // Not recorded as a tick error: the runtime may simply
                    // be stopped on this host.
                    Err(e) => tracing::debug!(error = %e, "failed to collect docker metrics"),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                result
                    .lock()
                    .unwrap()
                    .errors
                    .push(format!("collection task failed: {e}"));
            }
        }

        let mut guard = result.lock().unwrap();
        std::mem::take(&mut *guard)
    }
}

fn record_error(result: &Arc<Mutex<CollectionResult>>, source: &str, error: &anyhow::Error) {
    result
        .lock()
        .unwrap()
        .errors
        .push(format!("failed to collect {source} metrics: {error}"));
}
