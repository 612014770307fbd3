//! Configuration management for process-status.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::{Args, ConfigFormat, LogLevel};
use crate::engine::{EngineOptions, DEFAULT_NAMESPACE};
use crate::process::CpuMode;

pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Locations probed when no `--config` is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 6] = [
    "/etc/process-status/config.yaml",
    "/etc/process-status/config.yml",
    "/etc/process-status/config.json",
    "./process-status.yaml",
    "./process-status.yml",
    "./process-status.json",
];

/// Effective probe configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Storage and sources
    #[serde(alias = "state-dir")]
    pub state_dir: Option<PathBuf>,
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,

    // Delta computation
    #[serde(alias = "cpu-mode")]
    pub cpu_mode: Option<CpuMode>,
    #[serde(alias = "max-snapshot-age-secs")]
    pub max_snapshot_age_secs: Option<u64>,

    // Output
    pub namespace: Option<String>,
    #[serde(alias = "enable-cpu")]
    pub enable_cpu: Option<bool>,
    #[serde(alias = "enable-cpu-split")]
    pub enable_cpu_split: Option<bool>,
    #[serde(alias = "enable-memory")]
    pub enable_memory: Option<bool>,
    #[serde(alias = "enable-fds")]
    pub enable_fds: Option<bool>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub loaded_from: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: Some(std::env::temp_dir()),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            cpu_mode: Some(CpuMode::default()),
            max_snapshot_age_secs: None,
            namespace: Some(DEFAULT_NAMESPACE.into()),
            enable_cpu: Some(true),
            enable_cpu_split: Some(true),
            enable_memory: Some(true),
            enable_fds: Some(true),
            log_level: Some("info".into()),
            loaded_from: None,
        }
    }
}

impl Config {
    /// Snapshot directory, falling back to the OS temp dir.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    /// Log level: CLI flag, then config, then info.
    pub fn log_level(&self, args: &Args) -> LogLevel {
        args.log_level
            .or_else(|| {
                self.log_level
                    .as_deref()
                    .and_then(|s| LogLevel::from_str(s, true).ok())
            })
            .unwrap_or(LogLevel::Info)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            namespace: self
                .namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.into()),
            cpu_mode: self.cpu_mode.unwrap_or_default(),
            max_snapshot_age_secs: self.max_snapshot_age_secs,
            enable_cpu: self.enable_cpu.unwrap_or(true),
            enable_cpu_split: self.enable_cpu_split.unwrap_or(true),
            enable_memory: self.enable_memory.unwrap_or(true),
            enable_fds: self.enable_fds.unwrap_or(true),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<()> {
    if let Some(ns) = cfg.namespace.as_deref() {
        if ns.is_empty() || ns.chars().any(char::is_whitespace) {
            bail!("Invalid namespace '{}': must be non-empty without whitespace", ns);
        }
    }

    let enable_cpu = cfg.enable_cpu.unwrap_or(true);
    let enable_memory = cfg.enable_memory.unwrap_or(true);
    let enable_fds = cfg.enable_fds.unwrap_or(true);
    if !(enable_cpu || enable_memory || enable_fds) {
        bail!("At least one of enable_cpu/enable_memory/enable_fds must be true");
    }

    if cfg.max_snapshot_age_secs == Some(0) {
        bail!("max_snapshot_age_secs must be greater than 0 when set");
    }

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_str(level, true).is_err() {
            bail!(
                "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                level
            );
        }
    }

    if let Some(dir) = cfg.state_dir.as_deref() {
        if dir.exists() && !dir.is_dir() {
            bail!("state_dir is not a directory: {}", dir.display());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(dir) = &args.state_dir {
        config.state_dir = Some(dir.clone());
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(mode) = args.cpu_mode {
        config.cpu_mode = Some(mode);
    }
    if let Some(age) = args.max_snapshot_age_secs {
        config.max_snapshot_age_secs = Some(age);
    }
    if let Some(ns) = &args.namespace {
        config.namespace = Some(ns.clone());
    }

    // Feature flags
    if args.disable_cpu_split {
        config.enable_cpu_split = Some(false);
    }
    if args.disable_fds {
        config.enable_fds = Some(false);
    }
    if args.disable_memory {
        config.enable_memory = Some(false);
    }

    Ok(config)
}

/// Loads `path`, or the first existing default location, or built-in defaults.
///
/// An explicitly given path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                bail!("Config file not found: {}", p.display());
            }
            p.to_path_buf()
        }
        None => {
            let found = DEFAULT_CONFIG_PATHS
                .iter()
                .copied()
                .map(Path::new)
                .find(|p| p.exists());
            match found {
                Some(p) => p.to_path_buf(),
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let mut config = parse_config(&path, &content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    fill_defaults(&mut config);
    config.loaded_from = Some(path);
    Ok(config)
}

fn parse_config(path: &Path, content: &str) -> Result<Config> {
    let config: Config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        // Default to YAML
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}

/// Fields missing from a config file take the built-in default.
fn fill_defaults(config: &mut Config) {
    let defaults = Config::default();
    config.state_dir = config.state_dir.take().or(defaults.state_dir);
    config.proc_root = config.proc_root.take().or(defaults.proc_root);
    config.cpu_mode = config.cpu_mode.or(defaults.cpu_mode);
    config.namespace = config.namespace.take().or(defaults.namespace);
    config.enable_cpu = config.enable_cpu.or(defaults.enable_cpu);
    config.enable_cpu_split = config.enable_cpu_split.or(defaults.enable_cpu_split);
    config.enable_memory = config.enable_memory.or(defaults.enable_memory);
    config.enable_fds = config.enable_fds.or(defaults.enable_fds);
    config.log_level = config.log_level.take().or(defaults.log_level);
}

/// Renders configuration in the requested format
pub fn render_config(config: &Config, format: ConfigFormat) -> Result<String> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}
