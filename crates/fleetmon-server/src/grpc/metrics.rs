//! Server side of the bidirectional metrics stream.

use crate::sink::SinkManager;
use fleetmon_common::proto::metric::metric_service_server::MetricService;
use fleetmon_common::proto::metric::{MetricsPayload, MetricsResponse};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

#[derive(Clone)]
pub struct MetricsService {
    sinks: Arc<SinkManager>,
    shutdown: CancellationToken,
}

impl MetricsService {
    pub fn new(sinks: Arc<SinkManager>, shutdown: CancellationToken) -> Self {
        Self { sinks, shutdown }
    }
}

#[tonic::async_trait]
impl MetricService for MetricsService {
    type StreamMetricsStream = ReceiverStream<Result<MetricsResponse, Status>>;

    async fn stream_metrics(
        &self,
        request: Request<Streaming<MetricsPayload>>,
    ) -> Result<Response<Self::StreamMetricsStream>, Status> {
        let peer = request
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        tracing::info!(peer = %peer, "new metrics stream started");

        let mut inbound = request.into_inner();
        let sinks = self.sinks.clone();
        let shutdown = self.shutdown.clone();
        // Capacity 1 keeps the loop strictly payload -> ack -> next payload.
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        let farewell = MetricsResponse {
                            status: "shutdown".to_string(),
                            message: "server is shutting down".to_string(),
                        };
                        if tx.send(Ok(farewell)).await.is_err() {
                            tracing::debug!("failed to send shutdown notification");
                        }
                        tracing::info!(peer = %peer, "metrics stream closed for shutdown");
                        return;
                    }
                    message = inbound.message() => match message {
                        Ok(Some(payload)) => {
                            let hostname = payload
                                .host
                                .as_ref()
                                .map(|host| host.hostname.as_str())
                                .unwrap_or("");
                            tracing::debug!(
                                hostname = %hostname,
                                cpu_count = payload.cpu.len(),
                                disk_count = payload.disk.len(),
                                network_count = payload.network.len(),
                                docker_count = payload.docker.len(),
                                "received metrics"
                            );

                            if let Err(e) = sinks.store_all(&payload).await {
                                tracing::error!(error = %e, "failed to store metrics");
                                let _ = tx
                                    .send(Err(Status::internal("failed to store metrics")))
                                    .await;
                                return;
                            }

                            let ack = MetricsResponse {
                                status: "ok".to_string(),
                                message: "metrics received and stored successfully".to_string(),
                            };
                            if tx.send(Ok(ack)).await.is_err() {
                                tracing::info!(peer = %peer, "metrics stream terminated by client");
                                return;
                            }
                        }
                        Ok(None) => {
                            tracing::info!(peer = %peer, "metrics stream closed by client");
                            return;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "error receiving metrics");
                            let _ = tx
                                .send(Err(Status::internal("failed to receive metrics")))
                                .await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
