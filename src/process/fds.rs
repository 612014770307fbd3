//! File descriptor usage of the target process.
//!
//! Open descriptors are counted from `/proc/<pid>/fd`; the limit is the soft
//! `Max open files` value from `/proc/<pid>/limits`.

use std::fs;
use std::path::Path;

use crate::error::ProbeError;

/// Open descriptor count and soft limit. `limit` is `None` when unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdUsage {
    pub open: u64,
    pub limit: Option<u64>,
}

impl FdUsage {
    /// Share of the limit in use, or `None` when there is no finite limit.
    pub fn percent(&self) -> Option<f64> {
        match self.limit {
            Some(limit) if limit > 0 => Some(self.open as f64 / limit as f64 * 100.0),
            _ => None,
        }
    }
}

/// Parses the soft `Max open files` limit.
///
/// Format: `Max open files            1024                 524288               files`
pub fn parse_max_open_files(limits: &str) -> Option<Option<u64>> {
    let line = limits.lines().find(|l| l.starts_with("Max open files"))?;
    let soft = line.strip_prefix("Max open files")?.split_whitespace().next()?;
    if soft == "unlimited" {
        return Some(None);
    }
    soft.parse::<u64>().ok().map(Some)
}

/// Reads descriptor usage for `pid`. Usually needs the same uid or CAP_SYS_PTRACE.
pub fn read_fd_usage(proc_root: &Path, pid: u32) -> Result<FdUsage, ProbeError> {
    let pid_dir = proc_root.join(pid.to_string());

    let fd_dir = pid_dir.join("fd");
    let open = fs::read_dir(&fd_dir)
        .map_err(|e| ProbeError::from_process_io(pid, &fd_dir, e))?
        .count() as u64;

    let limits_path = pid_dir.join("limits");
    let limits = fs::read_to_string(&limits_path)
        .map_err(|e| ProbeError::from_process_io(pid, &limits_path, e))?;
    let limit = parse_max_open_files(&limits)
        .ok_or_else(|| ProbeError::malformed(&limits_path, "Max open files not found"))?;

    Ok(FdUsage { open, limit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const LIMITS: &str = "Limit                     Soft Limit           Hard Limit           Units     \n\
                          Max cpu time              unlimited            unlimited            seconds   \n\
                          Max open files            1024                 524288               files     \n\
                          Max locked memory         8388608              8388608              bytes     \n";

    #[test]
    fn test_parse_max_open_files_soft_limit() {
        assert_eq!(parse_max_open_files(LIMITS), Some(Some(1024)));
    }

    #[test]
    fn test_parse_max_open_files_unlimited() {
        let limits = "Max open files            unlimited            unlimited            files\n";
        assert_eq!(parse_max_open_files(limits), Some(None));
    }

    #[test]
    fn test_parse_max_open_files_missing() {
        assert_eq!(parse_max_open_files("Max cpu time  unlimited unlimited seconds\n"), None);
    }

    #[test]
    fn test_percent() {
        let usage = FdUsage {
            open: 42,
            limit: Some(1024),
        };
        let pct = usage.percent().unwrap();
        assert!((pct - 4.1015625).abs() < 1e-9, "got {}", pct);

        let unlimited = FdUsage {
            open: 42,
            limit: None,
        };
        assert_eq!(unlimited.percent(), None);

        let zero = FdUsage {
            open: 0,
            limit: Some(0),
        };
        assert_eq!(zero.percent(), None);
    }

    #[test]
    fn test_read_fd_usage() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pid_dir = dir.path().join("55");
        let fd_dir = pid_dir.join("fd");
        std::fs::create_dir_all(&fd_dir).unwrap();
        for fd in 0..3 {
            std::fs::write(fd_dir.join(fd.to_string()), "").unwrap();
        }
        std::fs::write(pid_dir.join("limits"), LIMITS).unwrap();

        let usage = read_fd_usage(dir.path(), 55).unwrap();
        assert_eq!(usage.open, 3);
        assert_eq!(usage.limit, Some(1024));
    }
}
