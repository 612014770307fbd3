//! Counter source abstraction.
//!
//! [`CounterSource`] is the read-only view of the kernel accounting the
//! delta engine needs. [`ProcFs`] implements it on top of a proc filesystem
//! mounted at a configurable root.

use std::path::{Path, PathBuf};

use crate::error::ProbeError;
use crate::process::{read_fd_usage, read_process_cpu, read_resident_bytes, FdUsage, ProcessCpu};
use crate::system::{read_cpu_times, read_mem_total};

/// System-wide counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemCounters {
    /// Sum of all CPU accounting fields since boot, in ticks.
    pub cpu_total: u64,
}

/// Memory counters for the target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub resident_bytes: u64,
    pub system_total_bytes: u64,
}

impl MemoryUsage {
    pub fn percent(&self) -> Option<f64> {
        if self.system_total_bytes == 0 {
            return None;
        }
        Some(self.resident_bytes as f64 / self.system_total_bytes as f64 * 100.0)
    }
}

/// Instantaneous counters that need no history.
///
/// Memory is required; descriptor stats may fail on their own (typically
/// permissions) without invalidating the rest of the sample.
#[derive(Debug)]
pub struct AuxCounters {
    pub memory: MemoryUsage,
    pub fds: Result<FdUsage, ProbeError>,
}

/// Read-only access to the kernel counters of one host.
pub trait CounterSource {
    fn sample_system(&self) -> Result<SystemCounters, ProbeError>;

    fn sample_process(&self, pid: u32) -> Result<ProcessCpu, ProbeError>;

    fn sample_memory(&self, pid: u32) -> Result<MemoryUsage, ProbeError>;

    fn sample_fds(&self, pid: u32) -> Result<FdUsage, ProbeError>;

    fn sample_aux(&self, pid: u32) -> Result<AuxCounters, ProbeError> {
        Ok(AuxCounters {
            memory: self.sample_memory(pid)?,
            fds: self.sample_fds(pid),
        })
    }
}

/// Counter source backed by procfs.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl CounterSource for ProcFs {
    fn sample_system(&self) -> Result<SystemCounters, ProbeError> {
        let times = read_cpu_times(&self.root)?;
        Ok(SystemCounters {
            cpu_total: times.total(),
        })
    }

    fn sample_process(&self, pid: u32) -> Result<ProcessCpu, ProbeError> {
        read_process_cpu(&self.root, pid)
    }

    fn sample_memory(&self, pid: u32) -> Result<MemoryUsage, ProbeError> {
        Ok(MemoryUsage {
            resident_bytes: read_resident_bytes(&self.root, pid)?,
            system_total_bytes: read_mem_total(&self.root)?,
        })
    }

    fn sample_fds(&self, pid: u32) -> Result<FdUsage, ProbeError> {
        read_fd_usage(&self.root, pid)
    }
}
