//! process-status library
//!
//! One-shot probe for a single process: it samples CPU ticks, resident
//! memory and open file descriptors from procfs and prints metric lines in
//! the `<name>\t<value>\t<unix_timestamp>` text protocol. CPU usage is a
//! rate, so each run stores its sample on disk and diffs it against the
//! sample stored by the previous run.
//!
//! # Usage
//!
//! ```rust,no_run
//! use process_status::{
//!     DeltaEngine, EngineOptions, FileSnapshotStore, MetricEmitter, ProcFs,
//! };
//!
//! let store = FileSnapshotStore::new(std::env::temp_dir(), 1000);
//! let key = store.key("nginx", 4242);
//! let engine = DeltaEngine::new(ProcFs::default(), store, EngineOptions::default());
//!
//! let mut emitter = MetricEmitter::new(std::io::stdout());
//! let now = chrono::Utc::now().timestamp();
//! match engine.run(&key, &mut emitter, now) {
//!     Ok(report) => println!("{} metrics", report.metrics_emitted),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```

pub mod cli;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod process;
pub mod snapshot;
pub mod source;
pub mod system;

// Re-export main types for convenience
pub use emitter::{MetricEmitter, MetricValue};
pub use engine::{compute_cpu_rates, Baseline, CpuRates, DeltaEngine, EngineOptions, PassReport};
pub use error::ProbeError;
pub use process::CpuMode;
pub use snapshot::{FileSnapshotStore, Snapshot, SnapshotKey, SnapshotStore};
pub use source::{AuxCounters, CounterSource, MemoryUsage, ProcFs, SystemCounters};
