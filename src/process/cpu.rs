//! CPU time parsing for the target process.
//!
//! This module reads the accounting fields of `/proc/<pid>/stat` and folds
//! them into user/system totals according to the configured [`CpuMode`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::ProbeError;

/// Which accounting categories count towards the process CPU total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuMode {
    /// utime + stime only.
    #[serde(rename = "self")]
    SelfOnly,
    /// utime + stime plus the times of waited-for children (cutime + cstime).
    #[default]
    Children,
}

impl fmt::Display for CpuMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuMode::SelfOnly => write!(f, "self"),
            CpuMode::Children => write!(f, "children"),
        }
    }
}

impl FromStr for CpuMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self" => Ok(CpuMode::SelfOnly),
            "children" => Ok(CpuMode::Children),
            other => Err(format!(
                "Invalid cpu_mode '{}', expected 'self' or 'children'",
                other
            )),
        }
    }
}

/// Raw CPU accounting of one process, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessCpu {
    pub utime: u64,
    pub stime: u64,
    pub cutime: u64,
    pub cstime: u64,
    /// Field 22, start time after boot. Changes when a PID is reused.
    pub start_ticks: u64,
}

impl ProcessCpu {
    pub fn user(&self, mode: CpuMode) -> u64 {
        match mode {
            CpuMode::SelfOnly => self.utime,
            CpuMode::Children => self.utime + self.cutime,
        }
    }

    pub fn system(&self, mode: CpuMode) -> u64 {
        match mode {
            CpuMode::SelfOnly => self.stime,
            CpuMode::Children => self.stime + self.cstime,
        }
    }

    pub fn total(&self, mode: CpuMode) -> u64 {
        self.user(mode) + self.system(mode)
    }
}

/// Parses the content of `/proc/<pid>/stat`.
///
/// The command name (field 2) may contain spaces and parentheses, so fields
/// are counted from the last `)`.
pub fn parse_stat(content: &str) -> Option<ProcessCpu> {
    let rest = &content[content.rfind(')')? + 1..];
    // rest[0] is field 3 (state)
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 20 {
        return None;
    }

    let unsigned = |idx: usize| fields[idx].parse::<u64>().ok();
    // cutime/cstime are signed longs in the kernel
    let signed = |idx: usize| fields[idx].parse::<i64>().ok().map(|v| v.max(0) as u64);

    Some(ProcessCpu {
        utime: unsigned(11)?,
        stime: unsigned(12)?,
        cutime: signed(13)?,
        cstime: signed(14)?,
        start_ticks: unsigned(19)?,
    })
}

/// Reads CPU accounting for `pid` under `proc_root`.
pub fn read_process_cpu(proc_root: &Path, pid: u32) -> Result<ProcessCpu, ProbeError> {
    let path = proc_root.join(pid.to_string()).join("stat");
    let content =
        fs::read_to_string(&path).map_err(|e| ProbeError::from_process_io(pid, &path, e))?;

    parse_stat(&content).ok_or_else(|| ProbeError::malformed(&path, "Invalid stat format"))
}
