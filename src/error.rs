//! Error taxonomy for a sampling pass.
//!
//! Every failure a pass can hit maps onto one [`ProbeError`] variant so the
//! caller can tell the expected first-run state apart from real errors.

use nix::errno::Errno;
use std::io;
use std::path::{Path, PathBuf};

/// Errors raised while sampling counters, loading or saving snapshots,
/// or deriving rates.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Bad or missing CLI/config input, detected before any sampling.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// The target process does not exist (or exited mid-read).
    #[error("process {pid} not found")]
    ProcessNotFound { pid: u32 },

    #[error("permission denied reading {}", path.display())]
    PermissionDenied { path: PathBuf },

    /// The accounting interface is missing or its content is malformed.
    #[error("{} unavailable: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    /// No previous snapshot exists. Expected on first run.
    #[error("no snapshot at {}", path.display())]
    SnapshotNotFound { path: PathBuf },

    /// The persisted snapshot could not be decoded.
    #[error("failed to parse snapshot {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// A counter delta was non-positive, so no rate can be derived.
    #[error("invalid interval: {counter} delta is {delta}")]
    InvalidInterval { counter: &'static str, delta: i128 },

    /// The snapshot file could not be read or written.
    #[error("snapshot storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Metric lines could not be written to the output sink.
    #[error("failed to write metrics: {source}")]
    Output {
        #[source]
        source: io::Error,
    },
}

impl ProbeError {
    /// True for states that are part of normal operation rather than failures.
    pub fn is_expected(&self) -> bool {
        matches!(self, ProbeError::SnapshotNotFound { .. })
    }

    /// Classifies an I/O error raised while reading a `/proc/<pid>/...` file.
    pub fn from_process_io(pid: u32, path: &Path, err: io::Error) -> Self {
        // ESRCH shows up when the task is torn down between open and read
        if err.kind() == io::ErrorKind::NotFound
            || err.raw_os_error() == Some(Errno::ESRCH as i32)
        {
            return ProbeError::ProcessNotFound { pid };
        }
        Self::from_source_io(path, err)
    }

    /// Classifies an I/O error raised while reading a system-wide file.
    pub fn from_source_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => ProbeError::SourceUnavailable {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
        }
    }

    pub fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        ProbeError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}
