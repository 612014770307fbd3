//! Resident memory of the target process.
//!
//! This module reads `VmRSS` from `/proc/<pid>/status`.

use std::fs;
use std::path::Path;

use crate::error::ProbeError;

/// Parses kilobyte values from `Key:   1234 kB` style lines.
pub fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace().next()?.parse().ok()
}

/// Extracts `VmRSS` in bytes from status content.
/// Kernel threads have no `VmRSS` line, which is reported as 0.
pub fn parse_vm_rss(status: &str) -> Option<u64> {
    match status.lines().find_map(|l| l.strip_prefix("VmRSS:")) {
        Some(v) => parse_kb_value(v).map(|kb| kb * 1024),
        None => Some(0),
    }
}

/// Reads the resident set size of `pid` in bytes.
pub fn read_resident_bytes(proc_root: &Path, pid: u32) -> Result<u64, ProbeError> {
    let path = proc_root.join(pid.to_string()).join("status");
    let content =
        fs::read_to_string(&path).map_err(|e| ProbeError::from_process_io(pid, &path, e))?;

    parse_vm_rss(&content).ok_or_else(|| ProbeError::malformed(&path, "Invalid VmRSS value"))
}
