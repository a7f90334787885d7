//! Agent-side metrics stream manager.
//!
//! Owns the single long-lived bidirectional `StreamMetrics` stream. Each
//! tick's payload is written to the stream and the matching acknowledgement
//! awaited before the call returns; any failure tears the stream down and
//! the next tick drives a reconnect through the retry gate.

use crate::health::{bearer_value, HealthMonitor};
use anyhow::Result;
use fleetmon_common::backoff::RetryPolicy;
use fleetmon_common::proto::metric::metric_service_client::MetricServiceClient;
use fleetmon_common::proto::metric::{MetricsPayload, MetricsResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Endpoint;
use tonic::{Request, Streaming};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(15);
const SEND_BUFFER: usize = 16;

/// Result of handing one payload to the stream manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Sent and acknowledged by the server.
    Delivered,
    /// Dropped because the server is unhealthy; no connection attempt made.
    Skipped,
    /// Dropped because the stream is down or broke mid-send.
    StreamBroken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Streaming,
    Suspended,
}

struct ActiveStream {
    outbound: mpsc::Sender<MetricsPayload>,
    responses: Streaming<MetricsResponse>,
}

struct StreamState {
    phase: Phase,
    active: Option<ActiveStream>,
    retry: RetryPolicy,
    next_attempt_at: Option<Instant>,
}

pub struct StreamManager {
    endpoint: String,
    token: String,
    health: Arc<HealthMonitor>,
    state: Mutex<StreamState>,
}

impl StreamManager {
    pub fn new(endpoint: String, token: String, health: Arc<HealthMonitor>) -> Self {
        Self {
            endpoint,
            token,
            health,
            state: Mutex::new(StreamState {
                phase: Phase::Idle,
                active: None,
                retry: RetryPolicy::connect(),
                next_attempt_at: None,
            }),
        }
    }

    /// Hand one payload to the stream. Never buffers: a refused payload is
    /// gone, the next tick samples fresh data.
    pub async fn send(&self, payload: MetricsPayload) -> SendOutcome {
        let mut state = self.state.lock().await;

        if !self.health.is_healthy() {
            if state.active.take().is_some() {
                tracing::info!("suspending metrics stream, server unhealthy");
            }
            state.phase = Phase::Suspended;
            return SendOutcome::Skipped;
        }

        if state.phase == Phase::Suspended {
            state.phase = Phase::Connecting;
        }

        if state.active.is_none() {
            if let Some(at) = state.next_attempt_at {
                if Instant::now() < at {
                    tracing::debug!("reconnect gate still closed, dropping payload");
                    return SendOutcome::StreamBroken;
                }
            }
            state.phase = Phase::Connecting;
            match self.open_stream().await {
                Ok(active) => {
                    state.active = Some(active);
                    state.retry.reset();
                    state.next_attempt_at = None;
                    state.phase = Phase::Streaming;
                    tracing::info!("metrics stream established");
                }
                Err(e) => {
                    let delay = state.retry.next_delay();
                    state.next_attempt_at = Some(Instant::now() + delay);
                    tracing::warn!(
                        error = %e,
                        attempt = state.retry.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "failed to open metrics stream"
                    );
                    return SendOutcome::StreamBroken;
                }
            }
        }

        // Take the stream for the exchange; it is only put back after a
        // successful send/ack round trip.
        let Some(mut active) = state.active.take() else {
            return SendOutcome::StreamBroken;
        };

        if active.outbound.send(payload).await.is_err() {
            tracing::warn!("metrics stream send side closed");
            state.phase = Phase::Connecting;
            return SendOutcome::StreamBroken;
        }

        match active.responses.message().await {
            Ok(Some(response)) => {
                if response.status == "shutdown" {
                    tracing::info!(message = %response.message, "server shutting down, closing stream");
                    state.phase = Phase::Connecting;
                    SendOutcome::StreamBroken
                } else {
                    tracing::debug!(status = %response.status, "payload acknowledged");
                    state.active = Some(active);
                    SendOutcome::Delivered
                }
            }
            Ok(None) => {
                tracing::warn!("metrics stream closed by server");
                state.phase = Phase::Connecting;
                SendOutcome::StreamBroken
            }
            Err(e) => {
                tracing::warn!(error = %e, "metrics stream receive failed");
                state.phase = Phase::Connecting;
                SendOutcome::StreamBroken
            }
        }
    }

    /// Drop the active stream, e.g. on shutdown. Closing the outbound side
    /// lets the server finish the stream cleanly.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.active.take().is_some() {
            tracing::info!("metrics stream closed");
        }
        state.phase = Phase::Idle;
    }

    async fn open_stream(&self) -> Result<ActiveStream> {
        let channel = Endpoint::from_shared(self.endpoint.clone())?
            .connect_timeout(CONNECT_TIMEOUT)
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(true)
            .connect()
            .await?;
        let mut client = MetricServiceClient::new(channel);

        let (outbound, rx) = mpsc::channel(SEND_BUFFER);
        let mut request = Request::new(ReceiverStream::new(rx));
        request
            .metadata_mut()
            .insert("authorization", bearer_value(&self.token)?);

        let responses = client.stream_metrics(request).await?.into_inner();
        Ok(ActiveStream {
            outbound,
            responses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_unhealthy_server() -> StreamManager {
        let health = Arc::new(HealthMonitor::new(
            "http://127.0.0.1:9".into(),
            "tok".into(),
            "host-a".into(),
            Duration::from_secs(30),
        ));
        StreamManager::new("http://127.0.0.1:9".into(), "tok".into(), health)
    }

    #[tokio::test]
    async fn send_is_skipped_while_unhealthy() {
        let manager = manager_with_unhealthy_server();
        let outcome = manager.send(MetricsPayload::default()).await;
        assert_eq!(outcome, SendOutcome::Skipped);
        assert_eq!(manager.state.lock().await.phase, Phase::Suspended);
    }

    #[tokio::test]
    async fn failed_open_arms_the_reconnect_gate() {
        let manager = manager_with_unhealthy_server();
        // Force the health gate open without a server; the connect to the
        // discard port then fails fast.
        manager.health.set_healthy(true);
        let first = manager.send(MetricsPayload::default()).await;
        assert_eq!(first, SendOutcome::StreamBroken);
        {
            let state = manager.state.lock().await;
            assert_eq!(state.retry.attempt(), 1);
            assert!(state.next_attempt_at.is_some());
        }
        // Gate is armed: an immediate retry is refused without connecting.
        let second = manager.send(MetricsPayload::default()).await;
        assert_eq!(second, SendOutcome::StreamBroken);
        let state = manager.state.lock().await;
        assert_eq!(state.retry.attempt(), 1);
    }
}
