//! Persistence of the previous counter sample.
//!
//! Each probe invocation is a fresh process, so the baseline for the next
//! delta lives on disk: one JSON record per (user, key prefix, pid).
//!
//! ## Disk Layout
//!
//! ```text
//! {state_dir}/
//!   1000-process-status-nginx-4242.json          # current record
//!   .process-status-Xa3k9Q.tmp                   # in-flight write, renamed on success
//! ```
//!
//! Writes go to a freshly created temp file in the same directory (random
//! name, `O_EXCL`), are fsynced, then renamed over the record, so a reader
//! sees either the old record or the new one.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ProbeError;
use crate::process::{CpuMode, ProcessCpu};
use crate::source::SystemCounters;

/// Schema version written into every record.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One persisted counter sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Wall-clock capture time, unix seconds.
    pub timestamp: i64,
    pub system_cpu_total: u64,
    pub process_cpu_total: u64,
    pub process_cpu_user: u64,
    pub process_cpu_system: u64,
    pub process_start_ticks: u64,
    pub cpu_mode: CpuMode,
}

impl Snapshot {
    pub fn capture(
        timestamp: i64,
        system: &SystemCounters,
        process: &ProcessCpu,
        mode: CpuMode,
    ) -> Self {
        Self {
            timestamp,
            system_cpu_total: system.cpu_total,
            process_cpu_total: process.total(mode),
            process_cpu_user: process.user(mode),
            process_cpu_system: process.system(mode),
            process_start_ticks: process.start_ticks,
            cpu_mode: mode,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Record {
    version: u32,
    #[serde(flatten)]
    snapshot: Snapshot,
}

#[derive(Deserialize)]
struct VersionTag {
    version: u32,
}

/// Encodes a record for storage.
pub fn encode(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Record {
        version: SNAPSHOT_VERSION,
        snapshot: *snapshot,
    })
}

/// Decodes a stored record, rejecting unknown schema versions.
pub fn decode(raw: &str) -> Result<Snapshot, String> {
    let tag: VersionTag = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    if tag.version != SNAPSHOT_VERSION {
        return Err(format!(
            "unsupported snapshot version {} (expected {})",
            tag.version, SNAPSHOT_VERSION
        ));
    }
    let record: Record = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    Ok(record.snapshot)
}

/// Identity a snapshot is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub uid: u32,
    pub key_prefix: String,
    pub pid: u32,
}

impl SnapshotKey {
    pub fn new(uid: u32, key_prefix: impl Into<String>, pid: u32) -> Self {
        Self {
            uid,
            key_prefix: key_prefix.into(),
            pid,
        }
    }

    /// File name for this key. The prefix is percent-encoded outside
    /// `[A-Za-z0-9_.-]`, which keeps distinct prefixes distinct.
    pub fn file_name(&self) -> String {
        format!(
            "{}-process-status-{}-{}.json",
            self.uid,
            encode_component(&self.key_prefix),
            self.pid
        )
    }
}

fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'.' | b'-' => out.push(b as char),
            _ => {
                let _ = write!(out, "%{:02X}", b);
            }
        }
    }
    out
}

/// Get/put storage for the previous sample of each identity.
pub trait SnapshotStore {
    fn exists(&self, key: &SnapshotKey) -> bool;

    /// Loads the snapshot for `key`.
    ///
    /// # Errors
    ///
    /// [`ProbeError::SnapshotNotFound`] when no record exists yet,
    /// [`ProbeError::Parse`] when the record is corrupt or of an unknown version.
    fn load(&self, key: &SnapshotKey) -> Result<Snapshot, ProbeError>;

    /// Replaces the snapshot for `key`. A crash mid-save never leaves a
    /// partially written record behind.
    fn save(&self, key: &SnapshotKey, snapshot: &Snapshot) -> Result<(), ProbeError>;
}

/// Snapshot store keeping one JSON file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    uid: u32,
}

impl FileSnapshotStore {
    /// Creates a store rooted at `dir` for the user `uid`.
    /// The directory is created lazily on first save.
    pub fn new(dir: impl Into<PathBuf>, uid: u32) -> Self {
        Self {
            dir: dir.into(),
            uid,
        }
    }

    /// Builds the key for this store's user.
    pub fn key(&self, key_prefix: &str, pid: u32) -> SnapshotKey {
        SnapshotKey::new(self.uid, key_prefix, pid)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    fn write_atomically(&self, path: &Path, content: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        // state_dir may be shared and world-writable: never open a guessable name
        let mut tmp = tempfile::Builder::new()
            .prefix(".process-status-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        // rename replaces a planted symlink at `path` instead of following it
        tmp.persist(path).map_err(|e| e.error)?;
        sync_dir(&self.dir)
    }
}

/// Fsync a directory to make the rename durable.
fn sync_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        fs::File::open(path)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

impl SnapshotStore for FileSnapshotStore {
    fn exists(&self, key: &SnapshotKey) -> bool {
        self.path_for(key).is_file()
    }

    fn load(&self, key: &SnapshotKey) -> Result<Snapshot, ProbeError> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ProbeError::SnapshotNotFound { path });
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(ProbeError::Parse {
                    path,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(ProbeError::Storage { path, source: e }),
        };

        let snapshot = decode(&raw).map_err(|reason| ProbeError::Parse {
            path: path.clone(),
            reason,
        })?;
        debug!("Loaded snapshot from {}", path.display());
        Ok(snapshot)
    }

    fn save(&self, key: &SnapshotKey, snapshot: &Snapshot) -> Result<(), ProbeError> {
        let path = self.path_for(key);
        let content = encode(snapshot).map_err(|e| ProbeError::Storage {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        if let Err(e) = self.write_atomically(&path, &content) {
            return Err(ProbeError::Storage { path, source: e });
        }
        debug!("Saved snapshot to {}", path.display());
        Ok(())
    }
}
