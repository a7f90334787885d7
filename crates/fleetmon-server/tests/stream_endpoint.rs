//! The bidirectional metrics stream against a live server instance.

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use fleetmon_common::proto::metric as pb;
use fleetmon_common::proto::metric::metric_service_client::MetricServiceClient;
use fleetmon_server::config::ServerConfig;
use fleetmon_server::server::Server;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

async fn spawn_accepting_tsdb() -> String {
    let app = Router::new().route(
        "/api/v1/import/prometheus",
        post(|| async { StatusCode::NO_CONTENT }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

async fn start_server(vm_endpoint: &str) -> Server {
    let config = ServerConfig {
        grpc_addr: "127.0.0.1:0".parse().unwrap(),
        vm_endpoint: vm_endpoint.to_string(),
        dsn: None,
        jwt_secret: None,
        jwt_refresh_secret: None,
    };
    let mut server = Server::new(config).unwrap();
    server.start().await.unwrap();
    server
}

fn payload(hostname: &str, sequence: i64) -> pb::MetricsPayload {
    pb::MetricsPayload {
        host: Some(pb::HostMetrics {
            hostname: hostname.to_string(),
            ..Default::default()
        }),
        cpu: vec![pb::CpuMetrics {
            usage_percent: 10.0,
            is_total: true,
            ..Default::default()
        }],
        ram: Some(pb::RamMetrics {
            total_octets: 2048,
            used_octets: 1024,
            used_percent: 50.0,
            ..Default::default()
        }),
        timestamp: Some(prost_types::Timestamp {
            seconds: 1_700_000_000 + sequence,
            nanos: 0,
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn each_payload_is_acknowledged_in_order() {
    let tsdb = spawn_accepting_tsdb().await;
    let mut server = start_server(&tsdb).await;
    let addr = server.local_addr().unwrap();

    let mut client = MetricServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();
    let (tx, rx) = mpsc::channel(8);
    let mut responses = client
        .stream_metrics(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    for sequence in 0..3 {
        tx.send(payload("host-a", sequence)).await.unwrap();
        let ack = responses.message().await.unwrap().unwrap();
        assert_eq!(ack.status, "ok");
    }

    // Closing the send side ends the stream cleanly.
    drop(tx);
    assert!(responses.message().await.unwrap().is_none());

    server.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn shutdown_sends_a_final_status_and_closes_the_stream() {
    let tsdb = spawn_accepting_tsdb().await;
    let mut server = start_server(&tsdb).await;
    let addr = server.local_addr().unwrap();

    let mut client = MetricServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();
    let (tx, rx) = mpsc::channel(8);
    let mut responses = client
        .stream_metrics(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    tx.send(payload("host-a", 0)).await.unwrap();
    let ack = responses.message().await.unwrap().unwrap();
    assert_eq!(ack.status, "ok");

    server.notify_shutdown();
    let farewell = responses.message().await.unwrap().unwrap();
    assert_eq!(farewell.status, "shutdown");
    assert!(responses.message().await.unwrap().is_none());

    server.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn stream_survives_a_rejecting_tsdb() {
    // Every sink POST fails; the fan-out still reports success upstream and
    // the stream keeps acknowledging payloads.
    let app = Router::new().route(
        "/api/v1/import/prometheus",
        post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tsdb = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    let mut server = start_server(&tsdb).await;
    let addr = server.local_addr().unwrap();

    let mut client = MetricServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();
    let (tx, rx) = mpsc::channel(8);
    let mut responses = client
        .stream_metrics(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    tx.send(payload("host-a", 0)).await.unwrap();
    let ack = responses.message().await.unwrap().unwrap();
    assert_eq!(ack.status, "ok");

    drop(tx);
    server.stop(Duration::from_secs(10)).await.unwrap();
}
