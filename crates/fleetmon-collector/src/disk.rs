use crate::procfs::{self, DiskIoCounters};
use anyhow::Result;
use fleetmon_common::types::DiskMetrics;
use std::collections::HashMap;
use sysinfo::Disks;
use tokio::sync::Mutex;

pub struct DiskCollector {
    disks: Mutex<Disks>,
}

impl Default for DiskCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCollector {
    pub fn new() -> Self {
        Self {
            disks: Mutex::new(Disks::new_with_refreshed_list()),
        }
    }

    pub async fn collect(&self) -> Result<Vec<DiskMetrics>> {
        let mut disks = self.disks.lock().await;
        disks.refresh();

        let io_counters = match procfs::read_disk_io() {
            Ok(counters) => counters,
            Err(e) => {
                tracing::debug!(error = %e, "failed to collect disk io counters");
                HashMap::new()
            }
        };

        let mut metrics = Vec::new();
        for disk in disks.iter() {
            let mount = disk.mount_point().to_string_lossy().to_string();
            let fstype = disk.file_system().to_string_lossy().to_string();
            if !is_relevant_partition(&mount, &fstype) {
                continue;
            }

            let total = disk.total_space();
            // Virtual mounts report zero capacity and are suppressed.
            if total == 0 {
                continue;
            }
            let free = disk.available_space();
            let used = total.saturating_sub(free);
            let device = disk.name().to_string_lossy().to_string();

            let mut metric = DiskMetrics {
                path: mount,
                device: device.clone(),
                fstype,
                total_octets: total,
                used_octets: used,
                free_octets: free,
                used_percent: if total > 0 {
                    (used as f64 / total as f64) * 100.0
                } else {
                    0.0
                },
                ..Default::default()
            };

            let device_name = device.strip_prefix("/dev/").unwrap_or(&device);
            if let Some(io) = io_counters.get(device_name) {
                apply_io_counters(&mut metric, io);
            }
            metrics.push(metric);
        }

        Ok(metrics)
    }
}

fn is_relevant_partition(mount: &str, fstype: &str) -> bool {
    if mount.starts_with("/System/Volumes")
        || mount.starts_with("/dev")
        || mount.starts_with("/snap/")
        || mount.starts_with("/proc")
        || mount.starts_with("/sys")
        || mount.starts_with("/run/")
    {
        return false;
    }
    !matches!(fstype, "devfs" | "autofs" | "none" | "tmpfs" | "overlay" | "squashfs")
}

fn apply_io_counters(metric: &mut DiskMetrics, io: &DiskIoCounters) {
    metric.read_count = io.read_count;
    metric.write_count = io.write_count;
    metric.read_octets = io.read_octets;
    metric.write_octets = io.write_octets;
}
