//! Health watch sessions: registration, check, and shutdown broadcast.

use fleetmon_common::proto::health::health_check_response::ServingStatus;
use fleetmon_common::proto::health::health_service_client::HealthServiceClient;
use fleetmon_common::proto::health::HealthCheckRequest;
use fleetmon_server::config::ServerConfig;
use fleetmon_server::server::Server;
use std::time::Duration;

async fn start_server() -> Server {
    let config = ServerConfig {
        grpc_addr: "127.0.0.1:0".parse().unwrap(),
        vm_endpoint: "http://localhost:8428".to_string(),
        dsn: None,
        jwt_secret: None,
        jwt_refresh_secret: None,
    };
    let mut server = Server::new(config).unwrap();
    server.start().await.unwrap();
    server
}

#[tokio::test]
async fn check_reports_serving() {
    let mut server = start_server().await;
    let addr = server.local_addr().unwrap();

    let mut client = HealthServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();
    let response = client
        .check(HealthCheckRequest {
            hostname: "host-a".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status(), ServingStatus::Serving);

    server.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn every_watcher_gets_one_not_serving_and_the_session_map_empties() {
    let mut server = start_server().await;
    let addr = server.local_addr().unwrap();

    let mut client = HealthServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();

    let mut streams = Vec::new();
    for i in 0..50 {
        let mut stream = client
            .watch(HealthCheckRequest {
                hostname: format!("host-{i}"),
            })
            .await
            .unwrap()
            .into_inner();
        let initial = stream.message().await.unwrap().unwrap();
        assert_eq!(initial.status(), ServingStatus::Serving);
        streams.push(stream);
    }

    assert_eq!(server.health_session_count(), 50);

    server.stop(Duration::from_secs(10)).await.unwrap();
    assert_eq!(server.health_session_count(), 0);

    for mut stream in streams {
        let last = stream.message().await.unwrap().unwrap();
        assert_eq!(last.status(), ServingStatus::NotServing);
        assert!(stream.message().await.unwrap().is_none());
    }
}

#[tokio::test]
async fn a_disconnecting_watcher_is_removed_from_the_session_map() {
    let mut server = start_server().await;
    let addr = server.local_addr().unwrap();

    let mut client = HealthServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();
    let stream = client
        .watch(HealthCheckRequest {
            hostname: "host-a".to_string(),
        })
        .await
        .unwrap()
        .into_inner();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while server.health_session_count() != 1 {
        assert!(tokio::time::Instant::now() < deadline, "session never registered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    drop(stream);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while server.health_session_count() != 0 {
        assert!(tokio::time::Instant::now() < deadline, "session never removed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    server.stop(Duration::from_secs(5)).await.unwrap();
}
