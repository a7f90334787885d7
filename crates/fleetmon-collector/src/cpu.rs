use crate::procfs::{self, CpuSnapshot};
use anyhow::Result;
use fleetmon_common::types::CpuMetrics;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use sysinfo::System;
use tokio::sync::Mutex;

const STATIC_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const WARMUP_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
struct StaticInfo {
    model: String,
    physical: i32,
    logical: i32,
    frequency_mhz: f64,
}

struct CachedStatic {
    info: StaticInfo,
    expires_at: Instant,
}

/// Derives per-core and aggregate usage from cumulative `/proc/stat`
/// counters kept between ticks. The first tick primes the counters, waits
/// out a short warm-up and resamples once.
pub struct CpuCollector {
    last: Mutex<Option<CpuSnapshot>>,
    cache: RwLock<Option<CachedStatic>>,
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuCollector {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
            cache: RwLock::new(None),
        }
    }

    pub async fn collect(&self) -> Result<Vec<CpuMetrics>> {
        let info = self.cached_static_info();

        let mut state = self.last.lock().await;
        let mut current = procfs::read_cpu_snapshot()?;

        let last = match state.take() {
            Some(snapshot) => snapshot,
            None => {
                let primed = current;
                tracing::debug!("initial cpu sample collected, retrying after warm-up");
                tokio::time::sleep(WARMUP_DELAY).await;
                current = procfs::read_cpu_snapshot()?;
                primed
            }
        };

        let total_usage = procfs::usage_percent(&current.total, &last.total);
        let per_core_usage: Vec<f64> = current
            .per_core
            .iter()
            .enumerate()
            .map(|(i, times)| match last.per_core.get(i) {
                Some(prev) => procfs::usage_percent(times, prev),
                None => 0.0,
            })
            .collect();

        let metrics = build_cpu_metrics(&info, &current, total_usage, &per_core_usage);
        *state = Some(current);
        Ok(metrics)
    }

    /// Read under the shared lock; on miss upgrade to exclusive and
    /// re-check so concurrent ticks refresh the probe only once.
    fn cached_static_info(&self) -> StaticInfo {
        if let Some(cached) = self.cache.read().unwrap().as_ref() {
            if Instant::now() < cached.expires_at {
                return cached.info.clone();
            }
        }

        let mut guard = self.cache.write().unwrap();
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.expires_at {
                return cached.info.clone();
            }
        }

        let info = probe_static_info();
        *guard = Some(CachedStatic {
            info: info.clone(),
            expires_at: Instant::now() + STATIC_CACHE_TTL,
        });
        info
    }
}

fn probe_static_info() -> StaticInfo {
    let mut system = System::new();
    system.refresh_cpu();
    let cpus = system.cpus();
    StaticInfo {
        model: cpus
            .first()
            .map(|c| c.brand().trim().to_string())
            .unwrap_or_default(),
        physical: system.physical_core_count().unwrap_or(cpus.len()) as i32,
        logical: cpus.len() as i32,
        frequency_mhz: cpus.first().map(|c| c.frequency() as f64).unwrap_or(0.0),
    }
}

fn build_cpu_metrics(
    info: &StaticInfo,
    snapshot: &CpuSnapshot,
    total_usage: f64,
    per_core_usage: &[f64],
) -> Vec<CpuMetrics> {
    let mut metrics = Vec::with_capacity(snapshot.per_core.len() + 1);

    metrics.push(CpuMetrics {
        model: info.model.clone(),
        cores: info.physical,
        threads: info.logical,
        frequency_mhz: info.frequency_mhz,
        usage_percent: total_usage,
        user_time: snapshot.total.user,
        system_time: snapshot.total.system,
        idle_time: snapshot.total.idle,
        core_id: 0,
        is_total: true,
    });

    let core_count = (info.physical as usize).min(snapshot.per_core.len());
    for i in 0..core_count {
        let times = &snapshot.per_core[i];
        metrics.push(CpuMetrics {
            model: format!("CPU {}", i + 1),
            cores: 1,
            threads: 1,
            frequency_mhz: info.frequency_mhz,
            usage_percent: per_core_usage.get(i).copied().unwrap_or(0.0),
            user_time: times.user,
            system_time: times.system,
            idle_time: times.idle,
            core_id: (i + 1) as i32,
            is_total: false,
        });
    }

    metrics
}
