use anyhow::Result;
use fleetmon_common::types::RamMetrics;
use sysinfo::System;
use tokio::sync::Mutex;

pub struct RamCollector {
    system: Mutex<System>,
}

impl Default for RamCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl RamCollector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    pub async fn collect(&self) -> Result<RamMetrics> {
        let mut system = self.system.lock().await;
        system.refresh_memory();

        Ok(build_ram_metrics(
            system.total_memory(),
            system.used_memory(),
            system.free_memory(),
            system.available_memory(),
            system.total_swap(),
            system.used_swap(),
        ))
    }
}

fn build_ram_metrics(
    total: u64,
    used: u64,
    free: u64,
    available: u64,
    swap_total: u64,
    swap_used: u64,
) -> RamMetrics {
    RamMetrics {
        total_octets: total,
        used_octets: used,
        free_octets: free,
        available_octets: available,
        used_percent: used_percent(used, total),
        swap_total_octets: swap_total,
        swap_used_octets: swap_used,
        swap_used_percent: used_percent(swap_used, swap_total),
    }
}

fn used_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((used as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
}
