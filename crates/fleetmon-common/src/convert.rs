//! Domain type to wire type conversion for outbound payloads.

use crate::proto::metric as pb;
use crate::types::{
    CpuMetrics, DiskMetrics, DockerMetrics, HostMetrics, MetricsPayload, NetworkMetrics,
    RamMetrics,
};
use chrono::{DateTime, Utc};

pub fn payload_to_proto(payload: &MetricsPayload) -> pb::MetricsPayload {
    pb::MetricsPayload {
        host: Some(host_to_proto(&payload.host)),
        cpu: payload.cpu.iter().map(cpu_to_proto).collect(),
        ram: Some(ram_to_proto(&payload.ram)),
        disk: payload.disk.iter().map(disk_to_proto).collect(),
        network: payload.network.iter().map(network_to_proto).collect(),
        docker: payload.docker.iter().map(docker_to_proto).collect(),
        timestamp: Some(datetime_to_proto(payload.timestamp)),
    }
}

pub fn datetime_to_proto(ts: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

pub fn host_to_proto(m: &HostMetrics) -> pb::HostMetrics {
    pb::HostMetrics {
        hostname: m.hostname.clone(),
        uptime: m.uptime,
        procs: m.procs,
        os: m.os.clone(),
        platform: m.platform.clone(),
        platform_family: m.platform_family.clone(),
        platform_version: m.platform_version.clone(),
        virtualization_system: m.virtualization_system.clone(),
        virtualization_role: m.virtualization_role.clone(),
        kernel_version: m.kernel_version.clone(),
    }
}

pub fn cpu_to_proto(m: &CpuMetrics) -> pb::CpuMetrics {
    pb::CpuMetrics {
        model: m.model.clone(),
        cores: m.cores,
        threads: m.threads,
        frequency_mhz: m.frequency_mhz,
        usage_percent: m.usage_percent,
        user_time: m.user_time,
        system_time: m.system_time,
        idle_time: m.idle_time,
        core_id: m.core_id,
        is_total: m.is_total,
    }
}

pub fn ram_to_proto(m: &RamMetrics) -> pb::RamMetrics {
    pb::RamMetrics {
        total_octets: m.total_octets,
        used_octets: m.used_octets,
        free_octets: m.free_octets,
        available_octets: m.available_octets,
        used_percent: m.used_percent,
        swap_total_octets: m.swap_total_octets,
        swap_used_octets: m.swap_used_octets,
        swap_used_percent: m.swap_used_percent,
    }
}

pub fn disk_to_proto(m: &DiskMetrics) -> pb::DiskMetrics {
    pb::DiskMetrics {
        path: m.path.clone(),
        device: m.device.clone(),
        fstype: m.fstype.clone(),
        total: m.total_octets,
        used: m.used_octets,
        free: m.free_octets,
        used_percent: m.used_percent,
        read_count: m.read_count,
        write_count: m.write_count,
        read_octets: m.read_octets,
        write_octets: m.write_octets,
    }
}

pub fn network_to_proto(m: &NetworkMetrics) -> pb::NetworkMetrics {
    pb::NetworkMetrics {
        interface_name: m.interface_name.clone(),
        bytes_sent: m.bytes_sent,
        bytes_recv: m.bytes_recv,
        packets_sent: m.packets_sent,
        packets_recv: m.packets_recv,
        err_in: m.err_in,
        err_out: m.err_out,
    }
}

pub fn docker_to_proto(m: &DockerMetrics) -> pb::DockerMetrics {
    pb::DockerMetrics {
        container_id: m.container_id.clone(),
        container_name: m.container_name.clone(),
        image: m.image.clone(),
        image_id: m.image_id.clone(),
        image_name: m.image_name.clone(),
        image_tag: m.image_tag.clone(),
        cpu_metrics: Some(cpu_to_proto(&m.cpu_metrics)),
        ram_metrics: Some(ram_to_proto(&m.ram_metrics)),
        disk_metrics: Some(disk_to_proto(&m.disk_metrics)),
        network_metrics: Some(network_to_proto(&m.network_metrics)),
    }
}
