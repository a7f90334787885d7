//! Server lifecycle: listener setup, service wiring, graceful shutdown.

use crate::auth::JwtKeys;
use crate::config::ServerConfig;
use crate::grpc::health::HealthCheckService;
use crate::grpc::interceptor::{AuthInterceptor, AuthRequirement};
use crate::grpc::metrics::MetricsService;
use crate::sink::SinkManager;
use anyhow::{anyhow, Context, Result};
use fleetmon_common::proto::health::health_service_server::HealthServiceServer;
use fleetmon_common::proto::metric::metric_service_server::MetricServiceServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;

pub struct Server {
    config: ServerConfig,
    shutdown: CancellationToken,
    health: HealthCheckService,
    metrics: MetricsService,
    jwt_keys: Option<JwtKeys>,
    handle: Option<JoinHandle<Result<(), tonic::transport::Error>>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let shutdown = CancellationToken::new();

        let sinks = Arc::new(
            SinkManager::new(&config.vm_endpoint)
                .map_err(|e| anyhow!("failed to build sink manager: {e}"))?,
        );

        let jwt_keys = match &config.jwt_secret {
            Some(secret) => {
                let refresh = config
                    .jwt_refresh_secret
                    .clone()
                    .unwrap_or_else(|| secret.clone());
                Some(JwtKeys::new(secret.clone(), refresh))
            }
            None => {
                tracing::warn!(
                    "no jwt secret configured, operator token validation is disabled"
                );
                None
            }
        };

        Ok(Self {
            metrics: MetricsService::new(sinks, shutdown.clone()),
            health: HealthCheckService::new(shutdown.clone()),
            jwt_keys,
            config,
            shutdown,
            handle: None,
            local_addr: None,
        })
    }

    /// Bind the listener and spawn the gRPC server; returns once the
    /// listener is accepting.
    pub async fn start(&mut self) -> Result<()> {
        let listener = TcpListener::bind(self.config.grpc_addr)
            .await
            .with_context(|| format!("failed to listen on {}", self.config.grpc_addr))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read listener address")?;
        self.local_addr = Some(local_addr);

        // Agent-facing services are not gated on operator credentials.
        let metric_service = MetricServiceServer::with_interceptor(
            self.metrics.clone(),
            AuthInterceptor::new(AuthRequirement::None, self.jwt_keys.clone()),
        );
        let health_service = HealthServiceServer::with_interceptor(
            self.health.clone(),
            AuthInterceptor::new(AuthRequirement::None, self.jwt_keys.clone()),
        );

        let shutdown = self.shutdown.clone();
        let router = tonic::transport::Server::builder()
            .add_service(metric_service)
            .add_service(health_service);

        self.handle = Some(tokio::spawn(async move {
            router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                    shutdown.cancelled().await;
                })
                .await
        }));

        tracing::info!(addr = %local_addr, "grpc server listening");
        Ok(())
    }

    /// The bound address, available after `start`. Useful when binding
    /// port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn health_session_count(&self) -> usize {
        self.health.session_count()
    }

    /// Fire the shutdown branches of every open stream: metrics streams get
    /// a final "shutdown" response, health watchers get NOT_SERVING.
    pub fn notify_shutdown(&self) {
        tracing::info!("notifying clients about server shutdown");
        self.shutdown.cancel();
    }

    /// Graceful stop: notify clients, then wait for in-flight streams to
    /// drain, bounded by `timeout`.
    pub async fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.notify_shutdown();

        if let Some(mut handle) = self.handle.take() {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(Ok(()))) => tracing::info!("server stopped"),
                Ok(Ok(Err(e))) => return Err(anyhow!("grpc server error: {e}")),
                Ok(Err(e)) => return Err(anyhow!("grpc server task failed: {e}")),
                Err(_) => {
                    tracing::warn!("graceful stop timed out, aborting server task");
                    handle.abort();
                }
            }
        }

        Ok(())
    }
}
