use anyhow::Result;
use fleetmon_common::types::NetworkMetrics;
use sysinfo::Networks;
use tokio::sync::Mutex;

pub struct NetworkCollector {
    networks: Mutex<Networks>,
}

impl Default for NetworkCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkCollector {
    pub fn new() -> Self {
        Self {
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }

    /// Cumulative per-interface counters since boot; the server-side sink
    /// relies on the TSDB to derive rates.
    pub async fn collect(&self) -> Result<Vec<NetworkMetrics>> {
        let mut networks = self.networks.lock().await;
        networks.refresh();

        let mut metrics: Vec<NetworkMetrics> = networks
            .iter()
            .map(|(name, data)| NetworkMetrics {
                interface_name: name.clone(),
                bytes_sent: data.total_transmitted(),
                bytes_recv: data.total_received(),
                packets_sent: data.total_packets_transmitted(),
                packets_recv: data.total_packets_received(),
                err_in: data.total_errors_on_received(),
                err_out: data.total_errors_on_transmitted(),
            })
            .collect();

        metrics.sort_by(|a, b| a.interface_name.cmp(&b.interface_name));
        Ok(metrics)
    }
}
