use anyhow::Result;
use fleetmon_common::types::HostMetrics;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use sysinfo::System;
use tokio::sync::Mutex;
use uuid::Uuid;

const STATIC_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
struct StaticIdentity {
    hostname: String,
    os: String,
    platform: String,
    platform_family: String,
    platform_version: String,
    virtualization_system: String,
    virtualization_role: String,
    kernel_version: String,
}

struct CachedIdentity {
    identity: StaticIdentity,
    expires_at: Instant,
}

pub struct HostCollector {
    cache: RwLock<Option<CachedIdentity>>,
    system: Mutex<System>,
}

impl Default for HostCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCollector {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(None),
            system: Mutex::new(System::new()),
        }
    }

    pub async fn collect(&self) -> Result<HostMetrics> {
        let identity = self.cached_identity();

        let procs = {
            let mut system = self.system.lock().await;
            system.refresh_processes();
            system.processes().len() as u64
        };

        Ok(HostMetrics {
            hostname: identity.hostname,
            uptime: System::uptime(),
            procs,
            os: identity.os,
            platform: identity.platform,
            platform_family: identity.platform_family,
            platform_version: identity.platform_version,
            virtualization_system: identity.virtualization_system,
            virtualization_role: identity.virtualization_role,
            kernel_version: identity.kernel_version,
        })
    }

    fn cached_identity(&self) -> StaticIdentity {
        if let Some(cached) = self.cache.read().unwrap().as_ref() {
            if Instant::now() < cached.expires_at {
                return cached.identity.clone();
            }
        }

        let mut guard = self.cache.write().unwrap();
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.expires_at {
                return cached.identity.clone();
            }
        }

        let identity = probe_identity();
        *guard = Some(CachedIdentity {
            identity: identity.clone(),
            expires_at: Instant::now() + STATIC_CACHE_TTL,
        });
        identity
    }
}

fn probe_identity() -> StaticIdentity {
    let (virtualization_system, virtualization_role) = detect_virtualization();

    StaticIdentity {
        hostname: hostname(),
        os: std::env::consts::OS.to_string(),
        platform: System::name().unwrap_or_default(),
        platform_family: System::distribution_id(),
        platform_version: System::os_version().unwrap_or_default(),
        virtualization_system,
        virtualization_role,
        kernel_version: System::kernel_version().unwrap_or_default(),
    }
}

/// The machine's hostname, or the process-stable fallback id when lookup
/// fails. Used for payload assembly and for the health watch request.
pub fn hostname() -> String {
    match System::host_name() {
        Some(name) if !name.is_empty() => name,
        _ => fallback_hostname().to_string(),
    }
}

/// One UUID per agent process, so a host without a resolvable name keeps a
/// consistent identity across ticks and cache refreshes.
fn fallback_hostname() -> &'static str {
    static FALLBACK: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    FALLBACK.get_or_init(|| {
        let id = Uuid::new_v4().to_string();
        tracing::warn!(hostname = %id, "hostname lookup failed, using generated id");
        id
    })
}

fn detect_virtualization() -> (String, String) {
    if let Ok(hypervisor) = std::fs::read_to_string("/sys/hypervisor/type") {
        let hypervisor = hypervisor.trim();
        if !hypervisor.is_empty() {
            return (hypervisor.to_string(), "guest".to_string());
        }
    }
    (String::new(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probed_hostname_is_never_empty() {
        let identity = probe_identity();
        assert!(!identity.hostname.is_empty());
    }

    #[tokio::test]
    async fn collect_reports_fresh_dynamic_fields() {
        let collector = HostCollector::new();
        let metrics = collector.collect().await.unwrap();
        assert!(!metrics.hostname.is_empty());
        assert!(!metrics.os.is_empty());
    }
}
