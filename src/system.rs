//! System-wide counters from the proc filesystem.
//!
//! This module reads the aggregate CPU jiffies from `/proc/stat` and the
//! total physical memory from `/proc/meminfo`.

use std::fs;
use std::path::Path;

use crate::error::ProbeError;
use crate::process::memory::parse_kb_value;

/// Aggregate CPU time in clock ticks, as found on the `cpu` line of /proc/stat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    /// Total CPU time across all accounting fields.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

/// Parses one `cpu ...` line. Fields after `softirq` are optional on old kernels.
pub fn parse_cpu_line(line: &str) -> Option<CpuTimes> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 8 || !parts[0].starts_with("cpu") {
        return None;
    }

    let field = |idx: usize| -> Option<u64> {
        match parts.get(idx) {
            Some(v) => v.parse::<u64>().ok(),
            None => Some(0),
        }
    };

    Some(CpuTimes {
        user: field(1)?,
        nice: field(2)?,
        system: field(3)?,
        idle: field(4)?,
        iowait: field(5)?,
        irq: field(6)?,
        softirq: field(7)?,
        steal: field(8)?,
    })
}

/// Reads the aggregate `cpu` line of `<proc_root>/stat`.
pub fn read_cpu_times(proc_root: &Path) -> Result<CpuTimes, ProbeError> {
    let path = proc_root.join("stat");
    let content = fs::read_to_string(&path).map_err(|e| ProbeError::from_source_io(&path, e))?;

    content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .and_then(parse_cpu_line)
        .ok_or_else(|| ProbeError::malformed(&path, "no aggregate cpu line"))
}

/// Reads `MemTotal` from `<proc_root>/meminfo`, in bytes.
pub fn read_mem_total(proc_root: &Path) -> Result<u64, ProbeError> {
    let path = proc_root.join("meminfo");
    let content = fs::read_to_string(&path).map_err(|e| ProbeError::from_source_io(&path, e))?;

    content
        .lines()
        .find_map(|l| l.strip_prefix("MemTotal:"))
        .and_then(parse_kb_value)
        .map(|kb| kb * 1024)
        .ok_or_else(|| ProbeError::malformed(&path, "MemTotal not found"))
}
