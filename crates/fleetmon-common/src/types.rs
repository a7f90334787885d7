use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One collection tick's snapshot of a single host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsPayload {
    pub host: HostMetrics,
    pub cpu: Vec<CpuMetrics>,
    pub ram: RamMetrics,
    pub disk: Vec<DiskMetrics>,
    pub network: Vec<NetworkMetrics>,
    pub docker: Vec<DockerMetrics>,
    pub timestamp: DateTime<Utc>,
}

impl Default for MetricsPayload {
    fn default() -> Self {
        Self {
            host: HostMetrics::default(),
            cpu: Vec::new(),
            ram: RamMetrics::default(),
            disk: Vec::new(),
            network: Vec::new(),
            docker: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostMetrics {
    pub hostname: String,
    pub uptime: u64,
    pub procs: u64,
    pub os: String,
    pub platform: String,
    pub platform_family: String,
    pub platform_version: String,
    pub virtualization_system: String,
    pub virtualization_role: String,
    pub kernel_version: String,
}

/// A CPU sample. `is_total` marks the machine-wide aggregate; per-core
/// samples carry a 1-based `core_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub model: String,
    pub cores: i32,
    pub threads: i32,
    pub frequency_mhz: f64,
    pub usage_percent: f64,
    pub user_time: f64,
    pub system_time: f64,
    pub idle_time: f64,
    pub core_id: i32,
    pub is_total: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RamMetrics {
    pub total_octets: u64,
    pub used_octets: u64,
    pub free_octets: u64,
    pub available_octets: u64,
    pub used_percent: f64,
    pub swap_total_octets: u64,
    pub swap_used_octets: u64,
    pub swap_used_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub path: String,
    pub device: String,
    pub fstype: String,
    pub total_octets: u64,
    pub used_octets: u64,
    pub free_octets: u64,
    pub used_percent: f64,
    pub read_count: u64,
    pub write_count: u64,
    pub read_octets: u64,
    pub write_octets: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub interface_name: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub err_in: u64,
    pub err_out: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerMetrics {
    pub container_id: String,
    pub container_name: String,
    pub image: String,
    pub image_id: String,
    pub image_name: String,
    pub image_tag: String,
    pub cpu_metrics: CpuMetrics,
    pub ram_metrics: RamMetrics,
    pub disk_metrics: DiskMetrics,
    pub network_metrics: NetworkMetrics,
}
