//! Agent-side health monitor.
//!
//! Holds one long-lived `Watch` stream against the server's health service.
//! The agent is considered healthy exactly while that stream is open; the
//! collection orchestrator reads the flag once per tick to gate sampling.

use anyhow::Result;
use fleetmon_common::backoff::DoublingBackoff;
use fleetmon_common::proto::health::health_check_response::ServingStatus;
use fleetmon_common::proto::health::health_service_client::HealthServiceClient;
use fleetmon_common::proto::health::{HealthCheckRequest, HealthCheckResponse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::Endpoint;
use tonic::{Request, Streaming};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HealthMonitor {
    healthy: AtomicBool,
    endpoint: String,
    token: String,
    hostname: String,
    /// Pause between a cleanly closed watch session and the next open.
    reopen_interval: Duration,
}

impl HealthMonitor {
    pub fn new(endpoint: String, token: String, hostname: String, reopen_interval: Duration) -> Self {
        Self {
            healthy: AtomicBool::new(false),
            endpoint,
            token,
            hostname,
            reopen_interval,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(endpoint = %self.endpoint, "starting health watch");
        let mut backoff = DoublingBackoff::watch();

        while !cancel.is_cancelled() {
            match self.open_watch(&cancel).await {
                Ok(Some(mut stream)) => {
                    backoff.reset();
                    self.set_healthy(true);
                    let clean_close = self.pump(&mut stream, &cancel).await;
                    self.set_healthy(false);
                    if cancel.is_cancelled() {
                        break;
                    }
                    if clean_close {
                        // Server went away on purpose; re-check on the
                        // configured cadence instead of hammering it.
                        if !sleep_or_cancel(self.reopen_interval, &cancel).await {
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.set_healthy(false);
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        delay_secs = delay.as_secs(),
                        "health watch open failed, backing off"
                    );
                    if !sleep_or_cancel(delay, &cancel).await {
                        break;
                    }
                }
            }
        }

        self.set_healthy(false);
        tracing::info!("health watch stopped");
    }

    async fn open_watch(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Streaming<HealthCheckResponse>>> {
        let connect = async {
            let channel = Endpoint::from_shared(self.endpoint.clone())?
                .connect_timeout(CONNECT_TIMEOUT)
                .connect()
                .await?;
            let mut client = HealthServiceClient::new(channel);

            let mut request = Request::new(HealthCheckRequest {
                hostname: self.hostname.clone(),
            });
            request
                .metadata_mut()
                .insert("authorization", bearer_value(&self.token)?);

            Ok::<_, anyhow::Error>(client.watch(request).await?.into_inner())
        };

        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            result = connect => result.map(Some),
        }
    }

    /// Reads the stream until it ends. Returns true when the server closed
    /// it deliberately (NOT_SERVING followed by end of stream).
    async fn pump(
        &self,
        stream: &mut Streaming<HealthCheckResponse>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut server_said_goodbye = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                message = stream.message() => match message {
                    Ok(Some(response)) => match response.status() {
                        ServingStatus::Serving => {
                            tracing::debug!("health watch reports serving");
                        }
                        ServingStatus::NotServing => {
                            tracing::info!("server announced shutdown");
                            server_said_goodbye = true;
                        }
                        ServingStatus::Unknown => {
                            tracing::debug!("health watch reports unknown status");
                        }
                    },
                    Ok(None) => {
                        tracing::info!("health watch stream closed by server");
                        return server_said_goodbye;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "health watch stream failed");
                        return false;
                    }
                }
            }
        }
    }

    pub(crate) fn set_healthy(&self, healthy: bool) {
        let previous = self.healthy.swap(healthy, Ordering::Relaxed);
        if previous != healthy {
            if healthy {
                tracing::info!("server became healthy");
            } else {
                tracing::info!("server became unhealthy");
            }
        }
    }
}

pub(crate) fn bearer_value(token: &str) -> Result<AsciiMetadataValue> {
    AsciiMetadataValue::try_from(format!("Bearer {token}"))
        .map_err(|e| anyhow::anyhow!("invalid token for authorization metadata: {e}"))
}

/// Returns false when the cancellation token fired before the delay passed.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_starts_unhealthy() {
        let monitor = HealthMonitor::new(
            "http://127.0.0.1:9090".into(),
            "tok".into(),
            "host-a".into(),
            Duration::from_secs(30),
        );
        assert!(!monitor.is_healthy());
    }

    #[test]
    fn healthy_flag_transitions_both_ways() {
        let monitor = HealthMonitor::new(
            "http://127.0.0.1:9090".into(),
            "tok".into(),
            "host-a".into(),
            Duration::from_secs(30),
        );
        monitor.set_healthy(true);
        assert!(monitor.is_healthy());
        monitor.set_healthy(false);
        assert!(!monitor.is_healthy());
    }

    #[test]
    fn bearer_value_formats_token() {
        let value = bearer_value("secret").unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer secret");
    }
}
