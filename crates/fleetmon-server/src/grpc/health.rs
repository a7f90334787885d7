//! Health watch service: one registered session per connected agent, an
//! initial SERVING on open, NOT_SERVING broadcast on graceful shutdown.

use chrono::{DateTime, Utc};
use fleetmon_common::proto::health::health_check_response::ServingStatus;
use fleetmon_common::proto::health::health_service_server::HealthService;
use fleetmon_common::proto::health::{HealthCheckRequest, HealthCheckResponse};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub hostname: String,
    pub peer: String,
    pub connected_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HealthCheckService {
    sessions: Arc<Mutex<HashMap<String, SessionInfo>>>,
    shutdown: CancellationToken,
}

impl HealthCheckService {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    fn register(&self, session: SessionInfo) {
        tracing::debug!(
            session_id = %session.id,
            hostname = %session.hostname,
            peer = %session.peer,
            "client connected"
        );
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    fn unregister(&self, session_id: &str) {
        self.sessions.lock().unwrap().remove(session_id);
        tracing::debug!(session_id = %session_id, "client disconnected");
    }
}

fn status_response(status: ServingStatus) -> HealthCheckResponse {
    HealthCheckResponse {
        status: status as i32,
    }
}

#[tonic::async_trait]
impl HealthService for HealthCheckService {
    async fn check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(status_response(ServingStatus::Serving)))
    }

    type WatchStream = ReceiverStream<Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let peer = request
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default();
        let hostname = request.into_inner().hostname;
        tracing::info!(
            session_id = %session_id,
            hostname = %hostname,
            peer = %peer,
            "new health watch stream started"
        );

        self.register(SessionInfo {
            id: session_id.clone(),
            hostname,
            peer,
            connected_at: Utc::now(),
        });

        let (tx, rx) = mpsc::channel(4);
        if tx
            .send(Ok(status_response(ServingStatus::Serving)))
            .await
            .is_err()
        {
            self.unregister(&session_id);
            return Err(Status::internal("failed to send initial health status"));
        }

        let service = self.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                // Receiver dropped: the client went away.
                _ = tx.closed() => {}
                _ = shutdown.cancelled() => {
                    tracing::info!(session_id = %session_id, "server is shutting down, notifying client");
                    let _ = tx
                        .send(Ok(status_response(ServingStatus::NotServing)))
                        .await;
                }
            }
            service.unregister(&session_id);
            tracing::info!(session_id = %session_id, "health watch stream terminated");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
