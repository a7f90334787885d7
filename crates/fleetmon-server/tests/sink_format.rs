//! Line protocol rendering for every sink family.

use fleetmon_common::proto::metric as pb;
use fleetmon_server::sink::{CpuSink, DiskSink, DockerSink, MetricSink, NetworkSink, RamSink};

const TS: i64 = 1_700_000_000_000;

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn sample_payload() -> pb::MetricsPayload {
    pb::MetricsPayload {
        host: Some(pb::HostMetrics {
            hostname: "host-a".to_string(),
            ..Default::default()
        }),
        cpu: vec![
            pb::CpuMetrics {
                model: "Xeon".to_string(),
                usage_percent: 42.5,
                is_total: true,
                ..Default::default()
            },
            pb::CpuMetrics {
                model: "Xeon".to_string(),
                core_id: 1,
                usage_percent: 50.0,
                user_time: 100.25,
                system_time: 20.5,
                idle_time: 900.0,
                ..Default::default()
            },
        ],
        ram: Some(pb::RamMetrics {
            total_octets: 2048,
            used_octets: 1024,
            used_percent: 50.0,
            ..Default::default()
        }),
        disk: vec![pb::DiskMetrics {
            path: "/".to_string(),
            device: "/dev/sda1".to_string(),
            fstype: "ext4".to_string(),
            total: 1000,
            used: 400,
            used_percent: 40.0,
            ..Default::default()
        }],
        network: vec![pb::NetworkMetrics {
            interface_name: "eth0".to_string(),
            bytes_sent: 111,
            bytes_recv: 222,
            packets_sent: 3,
            packets_recv: 4,
            ..Default::default()
        }],
        docker: vec![pb::DockerMetrics {
            container_id: "abc123".to_string(),
            container_name: "web".to_string(),
            image: "nginx:1.25".to_string(),
            cpu_metrics: Some(pb::CpuMetrics {
                usage_percent: 12.5,
                ..Default::default()
            }),
            ram_metrics: Some(pb::RamMetrics {
                used_percent: 30.0,
                ..Default::default()
            }),
            network_metrics: Some(pb::NetworkMetrics {
                bytes_sent: 555,
                ..Default::default()
            }),
            ..Default::default()
        }],
        timestamp: Some(prost_types::Timestamp {
            seconds: 1_700_000_000,
            nanos: 0,
        }),
    }
}

#[test]
fn cpu_sink_renders_aggregate_and_per_core_lines() {
    let sink = CpuSink::new(client(), "http://localhost:8428");
    let lines = sink.format(&sample_payload(), TS);

    assert!(lines.contains(
        &"cpu_usage_percent_avg{host=\"host-a\"} 42.500000 1700000000000\n".to_string()
    ));
    assert!(lines.contains(
        &"cpu_usage_percent{host=\"host-a\",model=\"Xeon\",core_id=\"1\"} 50.000000 1700000000000\n"
            .to_string()
    ));
    assert!(lines.contains(
        &"cpu_user_time{host=\"host-a\",model=\"Xeon\",core_id=\"1\"} 100.250000 1700000000000\n"
            .to_string()
    ));
    // aggregate line + four per-core lines
    assert_eq!(lines.len(), 5);
}

#[test]
fn ram_sink_renders_total_used_and_percent() {
    let sink = RamSink::new(client(), "http://localhost:8428");
    let lines = sink.format(&sample_payload(), TS);

    assert_eq!(
        lines,
        vec![
            "ram_total_octets{host=\"host-a\"} 2048 1700000000000\n".to_string(),
            "ram_used_octets{host=\"host-a\"} 1024 1700000000000\n".to_string(),
            "ram_used_percent{host=\"host-a\"} 50.000000 1700000000000\n".to_string(),
        ]
    );
}

#[test]
fn ram_sink_renders_nothing_without_a_ram_sample() {
    let sink = RamSink::new(client(), "http://localhost:8428");
    let mut payload = sample_payload();
    payload.ram = None;
    assert!(sink.format(&payload, TS).is_empty());
}

#[test]
fn disk_sink_labels_carry_device_path_and_fstype() {
    let sink = DiskSink::new(client(), "http://localhost:8428");
    let lines = sink.format(&sample_payload(), TS);

    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "disk_total{host=\"host-a\",device=\"/dev/sda1\",path=\"/\",fstype=\"ext4\"} 1000 1700000000000\n"
    );
    assert_eq!(
        lines[2],
        "disk_used_percent{host=\"host-a\",device=\"/dev/sda1\",path=\"/\",fstype=\"ext4\"} 40.000000 1700000000000\n"
    );
}

#[test]
fn network_sink_renders_both_directions() {
    let sink = NetworkSink::new(client(), "http://localhost:8428");
    let lines = sink.format(&sample_payload(), TS);

    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "network_bytes_sent{host=\"host-a\",interface=\"eth0\"} 111 1700000000000\n"
    );
    assert_eq!(
        lines[1],
        "network_bytes_recv{host=\"host-a\",interface=\"eth0\"} 222 1700000000000\n"
    );
}

#[test]
fn docker_sink_renders_container_labels() {
    let sink = DockerSink::new(client(), "http://localhost:8428");
    let lines = sink.format(&sample_payload(), TS);

    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "docker_cpu_usage_percent{host=\"host-a\",container_id=\"abc123\",container_name=\"web\",image=\"nginx:1.25\"} 12.500000 1700000000000\n"
    );
    assert_eq!(
        lines[2],
        "docker_network_bytes_sent{host=\"host-a\",container_id=\"abc123\",container_name=\"web\",image=\"nginx:1.25\"} 555 1700000000000\n"
    );
}

#[tokio::test]
async fn storing_no_lines_is_a_successful_noop() {
    // The endpoint is unroutable; an empty store must not touch it.
    let sink = CpuSink::new(client(), "http://192.0.2.1:1");
    assert!(sink.store(Vec::new()).await.is_ok());
}
