//! Minimal `/proc` counter parsing for the cpu and disk collectors.
//!
//! Only the fields the collectors consume are parsed. The readers return
//! errors on non-Linux hosts; callers surface those as per-source errors.

use anyhow::{anyhow, Context, Result};

/// Linux reports CPU times in clock ticks; the kernel ABI pins USER_HZ at
/// 100 for all modern architectures.
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// Cumulative CPU times for one line of `/proc/stat`, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuTimes {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
}

impl CpuTimes {
    pub fn busy(&self) -> f64 {
        self.user + self.nice + self.system + self.iowait + self.irq + self.softirq + self.steal
    }
}

/// The aggregate `cpu` line plus one entry per `cpuN` line.
#[derive(Debug, Clone, Default)]
pub struct CpuSnapshot {
    pub total: CpuTimes,
    pub per_core: Vec<CpuTimes>,
}

pub fn read_cpu_snapshot() -> Result<CpuSnapshot> {
    let contents =
        std::fs::read_to_string("/proc/stat").context("failed to read /proc/stat")?;
    parse_cpu_snapshot(&contents)
}

pub fn parse_cpu_snapshot(contents: &str) -> Result<CpuSnapshot> {
    let mut snapshot = CpuSnapshot::default();
    let mut saw_total = false;

    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else { continue };
        if !label.starts_with("cpu") {
            continue;
        }

        let ticks: Vec<f64> = fields
            .map(|f| f.parse::<f64>().unwrap_or(0.0))
            .collect();
        if ticks.len() < 4 {
            return Err(anyhow!("malformed cpu line: {line}"));
        }
        let get = |i: usize| ticks.get(i).copied().unwrap_or(0.0) / CLOCK_TICKS_PER_SEC;
        let times = CpuTimes {
            user: get(0),
            nice: get(1),
            system: get(2),
            idle: get(3),
            iowait: get(4),
            irq: get(5),
            softirq: get(6),
            steal: get(7),
        };

        if label == "cpu" {
            snapshot.total = times;
            saw_total = true;
        } else {
            snapshot.per_core.push(times);
        }
    }

    if !saw_total {
        return Err(anyhow!("no aggregate cpu line in /proc/stat"));
    }
    Ok(snapshot)
}

/// Usage percent between two snapshots of the same CPU:
/// `((dtotal - didle) / dtotal) * 100`, where idle includes iowait.
pub fn usage_percent(current: &CpuTimes, last: &CpuTimes) -> f64 {
    let busy_delta = current.busy() - last.busy();
    let idle_delta = (current.idle + current.iowait) - (last.idle + last.iowait);
    let total = busy_delta + idle_delta;
    if total <= 0.0 {
        return 0.0;
    }
    (((total - idle_delta) / total) * 100.0).clamp(0.0, 100.0)
}

/// Cumulative I/O counters for one block device from `/proc/diskstats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskIoCounters {
    pub read_count: u64,
    pub write_count: u64,
    pub read_octets: u64,
    pub write_octets: u64,
}

const SECTOR_SIZE: u64 = 512;

pub fn read_disk_io() -> Result<std::collections::HashMap<String, DiskIoCounters>> {
    let contents =
        std::fs::read_to_string("/proc/diskstats").context("failed to read /proc/diskstats")?;
    Ok(parse_disk_io(&contents))
}

pub fn parse_disk_io(contents: &str) -> std::collections::HashMap<String, DiskIoCounters> {
    let mut counters = std::collections::HashMap::new();
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // major minor name reads _ sectors_read _ writes _ sectors_written ...
        if fields.len() < 10 {
            continue;
        }
        let parse = |s: &str| s.parse::<u64>().unwrap_or(0);
        counters.insert(
            fields[2].to_string(),
            DiskIoCounters {
                read_count: parse(fields[3]),
                read_octets: parse(fields[5]) * SECTOR_SIZE,
                write_count: parse(fields[7]),
                write_octets: parse(fields[9]) * SECTOR_SIZE,
            },
        );
    }
    counters
}
