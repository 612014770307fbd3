//! CLI arguments for process-status.
//!
//! This module defines the command-line interface using clap, plus the
//! `--version` banner with toolchain information captured at build time.

use clap::builder::NonEmptyStringValueParser;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::process::CpuMode;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "process-status",
    about = "Sample CPU, memory and fd usage of one process as metric lines",
    long_about = "Sample CPU, memory and fd usage of one process as metric lines.\n\n\
                  Each run reads the process counters from /proc, diffs them against \
                  the sample stored by the previous run and prints \
                  `<name>\\t<value>\\t<timestamp>` lines on stdout. The first run for \
                  a pid only stores a baseline.",
    disable_version_flag = true
)]
pub struct Args {
    /// Target process id
    #[arg(
        short = 'p',
        long,
        required_unless_present_any = ["version", "show_config", "check_config"]
    )]
    pub pid: Option<u32>,

    /// Metric key prefix, also part of the snapshot file name
    #[arg(
        long,
        value_parser = NonEmptyStringValueParser::new(),
        required_unless_present_any = ["version", "show_config", "check_config"]
    )]
    pub key_prefix: Option<String>,

    /// Show version and build information
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Log level for diagnostics on stderr [default: info]
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Directory holding the previous-sample files
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Mount point of the proc filesystem
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// CPU accounting: "self" (utime+stime) or "children" (also reaped children)
    #[arg(long)]
    pub cpu_mode: Option<CpuMode>,

    /// Discard baselines older than this many seconds
    #[arg(long)]
    pub max_snapshot_age_secs: Option<u64>,

    /// Metric namespace (first name component)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Do not emit the cpu .user/.system split
    #[arg(long)]
    pub disable_cpu_split: bool,

    /// Do not emit file descriptor metrics
    #[arg(long)]
    pub disable_fds: bool,

    /// Do not emit memory metrics
    #[arg(long)]
    pub disable_memory: bool,
}

/// Text printed by `--version`.
pub fn version_banner() -> String {
    format!(
        "{} {}\nCompiler: rustc {} ({}, {})\nBuilt: {} (commit {})\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown"),
        option_env!("VERGEN_RUSTC_CHANNEL").unwrap_or("unknown"),
        option_env!("VERGEN_RUSTC_HOST_TRIPLE").unwrap_or("unknown"),
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
    )
}
