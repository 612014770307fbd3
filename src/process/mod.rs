//! Per-process counters read from `/proc/<pid>`.
//!
//! This module provides:
//! - `cpu`: CPU tick accounting from /proc/<pid>/stat
//! - `memory`: resident memory from /proc/<pid>/status
//! - `fds`: open descriptor count and limit

pub mod cpu;
pub mod fds;
pub mod memory;

pub use cpu::{parse_stat, read_process_cpu, CpuMode, ProcessCpu};
pub use fds::{read_fd_usage, FdUsage};
pub use memory::{parse_kb_value, read_resident_bytes};
