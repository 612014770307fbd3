//! The delta engine: one sampling pass.
//!
//! A pass reads the current counters, loads the previous snapshot for the
//! key, derives CPU rates from the two, emits every metric it could compute
//! and stores the current sample as the next baseline.
//!
//! CPU percentages are ratios of process ticks to system ticks between the
//! two samples, so wall-clock time between invocations does not enter them.

use std::fmt;
use std::io::{self, Write};
use tracing::{debug, error, info, warn};

use crate::emitter::{MetricEmitter, MetricValue};
use crate::error::ProbeError;
use crate::process::{CpuMode, FdUsage};
use crate::snapshot::{Snapshot, SnapshotKey, SnapshotStore};
use crate::source::{CounterSource, MemoryUsage};

pub const DEFAULT_NAMESPACE: &str = "process-status";

/// Knobs for a pass, resolved from configuration.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub namespace: String,
    pub cpu_mode: CpuMode,
    /// Baselines older than this are discarded. `None` keeps them forever.
    pub max_snapshot_age_secs: Option<u64>,
    pub enable_cpu: bool,
    pub enable_cpu_split: bool,
    pub enable_memory: bool,
    pub enable_fds: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            cpu_mode: CpuMode::default(),
            max_snapshot_age_secs: None,
            enable_cpu: true,
            enable_cpu_split: true,
            enable_memory: true,
            enable_fds: true,
        }
    }
}

/// CPU usage between two snapshots, in percent of total system CPU time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuRates {
    pub percent: f64,
    pub user_percent: f64,
    pub system_percent: f64,
}

/// Why a loaded snapshot was not usable as a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The process start time changed: the pid now belongs to another process.
    PidReused,
    ModeChanged { previous: CpuMode, current: CpuMode },
    TooOld { age_secs: i64 },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::PidReused => write!(f, "pid was reused by a new process"),
            StaleReason::ModeChanged { previous, current } => {
                write!(f, "cpu mode changed from {} to {}", previous, current)
            }
            StaleReason::TooOld { age_secs } => write!(f, "baseline is {}s old", age_secs),
        }
    }
}

/// How the pass related to the stored baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Baseline {
    /// No snapshot existed.
    FirstRun,
    /// A snapshot existed but was discarded.
    Stale(StaleReason),
    /// A usable snapshot was found.
    Previous(Snapshot),
}

/// Outcome of a successful pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub baseline: Baseline,
    pub cpu: Option<CpuRates>,
    pub metrics_emitted: usize,
    pub snapshot: Snapshot,
}

/// Computes CPU rates from two snapshots of the same process.
///
/// # Errors
///
/// [`ProbeError::InvalidInterval`] when the system counter did not advance
/// or a process counter went backwards.
pub fn compute_cpu_rates(
    previous: &Snapshot,
    current: &Snapshot,
) -> Result<CpuRates, ProbeError> {
    let d_sys = delta(
        "system_cpu_total",
        previous.system_cpu_total,
        current.system_cpu_total,
    )?;
    if d_sys == 0 {
        return Err(ProbeError::InvalidInterval {
            counter: "system_cpu_total",
            delta: 0,
        });
    }
    let d_proc = delta(
        "process_cpu_total",
        previous.process_cpu_total,
        current.process_cpu_total,
    )?;
    let d_user = delta(
        "process_cpu_user",
        previous.process_cpu_user,
        current.process_cpu_user,
    )?;
    let d_system = delta(
        "process_cpu_system",
        previous.process_cpu_system,
        current.process_cpu_system,
    )?;

    let ratio = |d: u64| 100.0 * d as f64 / d_sys as f64;
    Ok(CpuRates {
        percent: ratio(d_proc),
        user_percent: ratio(d_user),
        system_percent: ratio(d_system),
    })
}

fn delta(counter: &'static str, previous: u64, current: u64) -> Result<u64, ProbeError> {
    let d = current as i128 - previous as i128;
    if d < 0 {
        return Err(ProbeError::InvalidInterval { counter, delta: d });
    }
    Ok(d as u64)
}

/// Checks whether `previous` may serve as the baseline for `current`.
pub fn stale_reason(
    previous: &Snapshot,
    current: &Snapshot,
    max_age_secs: Option<u64>,
) -> Option<StaleReason> {
    if previous.process_start_ticks != current.process_start_ticks {
        return Some(StaleReason::PidReused);
    }
    if previous.cpu_mode != current.cpu_mode {
        return Some(StaleReason::ModeChanged {
            previous: previous.cpu_mode,
            current: current.cpu_mode,
        });
    }
    if let Some(max_age) = max_age_secs {
        // timestamps come from disk and may be anything
        let age_secs = current.timestamp.saturating_sub(previous.timestamp);
        if age_secs > i64::try_from(max_age).unwrap_or(i64::MAX) {
            return Some(StaleReason::TooOld { age_secs });
        }
    }
    None
}

/// Runs sampling passes against a counter source and snapshot store.
pub struct DeltaEngine<S, T> {
    source: S,
    store: T,
    options: EngineOptions,
}

impl<S: CounterSource, T: SnapshotStore> DeltaEngine<S, T> {
    pub fn new(source: S, store: T, options: EngineOptions) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Runs one pass for `key` at wall-clock time `now` (unix seconds).
    ///
    /// Metrics computed before a late failure are still written to `emitter`,
    /// and the current sample is saved whenever the core counters were read,
    /// so a corrupt or unusable baseline is replaced for the next run.
    ///
    /// # Errors
    ///
    /// - counter source errors for the process CPU, memory or system counters
    ///   abort the pass before anything is emitted or saved;
    /// - [`ProbeError::Parse`] / [`ProbeError::InvalidInterval`] are returned
    ///   after emitting the remaining metrics and saving;
    /// - [`ProbeError::Output`] when the sink fails; the snapshot is still saved;
    /// - [`ProbeError::Storage`] when the new snapshot cannot be written and
    ///   nothing failed earlier.
    pub fn run<W: Write>(
        &self,
        key: &SnapshotKey,
        emitter: &mut MetricEmitter<W>,
        now: i64,
    ) -> Result<PassReport, ProbeError> {
        let pid = key.pid;
        let opts = &self.options;
        let emitted_before = emitter.emitted();

        let system = self.source.sample_system()?;
        let process = self.source.sample_process(pid)?;
        let aux = self.source.sample_aux(pid)?;
        let current = Snapshot::capture(now, &system, &process, opts.cpu_mode);
        debug!(
            "pid {}: system_cpu_total={} process_cpu_total={}",
            pid, current.system_cpu_total, current.process_cpu_total
        );

        let mut pending: Option<ProbeError> = None;

        let max_age = opts.max_snapshot_age_secs;
        let baseline = match self.store.load(key) {
            Ok(previous) => match stale_reason(&previous, &current, max_age) {
                Some(reason) => {
                    info!(
                        "Notice: discarding baseline for pid {} ({}), no CPU metrics this run",
                        pid, reason
                    );
                    Some(Baseline::Stale(reason))
                }
                None => Some(Baseline::Previous(previous)),
            },
            Err(e) if e.is_expected() => {
                info!(
                    "Notice: first execution for pid {} with key prefix '{}', no baseline yet",
                    pid, key.key_prefix
                );
                Some(Baseline::FirstRun)
            }
            Err(e) => {
                warn!("Previous snapshot unusable: {}", e);
                pending = Some(e);
                None
            }
        };

        let cpu = match (&baseline, opts.enable_cpu) {
            (Some(Baseline::Previous(previous)), true) => {
                match compute_cpu_rates(previous, &current) {
                    Ok(rates) => Some(rates),
                    Err(e) => {
                        warn!("Skipping CPU metrics for pid {}: {}", pid, e);
                        pending = Some(e);
                        None
                    }
                }
            }
            _ => None,
        };

        let fds = match aux.fds {
            Ok(fds) => Some(fds),
            Err(e) => {
                if opts.enable_fds {
                    warn!("Skipping fd metrics for pid {}: {}", pid, e);
                }
                None
            }
        };

        let written = self
            .emit_metrics(key, emitter, now, fds, cpu, aux.memory)
            .and_then(|()| emitter.flush());
        if let Err(source) = written {
            let e = ProbeError::Output { source };
            // the baseline is still refreshed below
            if pending.is_none() {
                pending = Some(e);
            } else {
                error!("{}", e);
            }
        }

        if let Err(e) = self.store.save(key, &current) {
            match pending {
                Some(first) => {
                    error!("{}", e);
                    return Err(first);
                }
                None => return Err(e),
            }
        }

        if let Some(e) = pending {
            return Err(e);
        }

        Ok(PassReport {
            // pending is None here, so the baseline was resolved
            baseline: baseline.unwrap_or(Baseline::FirstRun),
            cpu,
            metrics_emitted: emitter.emitted() - emitted_before,
            snapshot: current,
        })
    }

    /// Writes the metric lines of one pass in fixed order: fds, cpu, memory.
    fn emit_metrics<W: Write>(
        &self,
        key: &SnapshotKey,
        emitter: &mut MetricEmitter<W>,
        now: i64,
        fds: Option<FdUsage>,
        cpu: Option<CpuRates>,
        mem: MemoryUsage,
    ) -> io::Result<()> {
        let opts = &self.options;
        let ns = &opts.namespace;
        let prefix = &key.key_prefix;

        if opts.enable_fds {
            if let Some(fds) = fds {
                emitter.emit(
                    &format!("{ns}.fds_{prefix}.count"),
                    MetricValue::Int(fds.open),
                    now,
                )?;
                if let Some(limit) = fds.limit {
                    emitter.emit(
                        &format!("{ns}.fds_{prefix}.max"),
                        MetricValue::Int(limit),
                        now,
                    )?;
                }
                if let Some(pct) = fds.percent() {
                    emitter.emit(
                        &format!("{ns}.fds_usage_{prefix}.percentage"),
                        MetricValue::Float(pct),
                        now,
                    )?;
                }
            }
        }

        if let Some(rates) = cpu {
            emitter.emit(
                &format!("{ns}.cpu_{prefix}.percentage"),
                MetricValue::Float(rates.percent),
                now,
            )?;
            if opts.enable_cpu_split {
                emitter.emit(
                    &format!("{ns}.cpu_{prefix}.user"),
                    MetricValue::Float(rates.user_percent),
                    now,
                )?;
                emitter.emit(
                    &format!("{ns}.cpu_{prefix}.system"),
                    MetricValue::Float(rates.system_percent),
                    now,
                )?;
            }
        }

        if opts.enable_memory {
            emitter.emit(
                &format!("{ns}.mem_{prefix}.used"),
                MetricValue::Int(mem.resident_bytes),
                now,
            )?;
            emitter.emit(
                &format!("{ns}.mem_{prefix}.max"),
                MetricValue::Int(mem.system_total_bytes),
                now,
            )?;
            if let Some(pct) = mem.percent() {
                emitter.emit(
                    &format!("{ns}.mem_usage_{prefix}.percentage"),
                    MetricValue::Float(pct),
                    now,
                )?;
            }
        }
        Ok(())
    }
}
