//! process-status - version 0.1.0
//!
//! Entry point: parses arguments, resolves configuration, runs one sampling
//! pass and maps its outcome to the exit code.

use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::{debug, info, Level};

use process_status::cli::{version_banner, Args, LogLevel};
use process_status::config::{render_config, resolve_config, validate_effective_config, Config};
use process_status::{DeltaEngine, FileSnapshotStore, MetricEmitter, ProbeError, ProcFs};

/// Initializes tracing on stderr; stdout carries only metric lines.
fn setup_logging(level: LogLevel) {
    let log_level = match level {
        LogLevel::Off => return,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Resolves and validates configuration.
fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args)?;
    validate_effective_config(&config)?;
    Ok(config)
}

/// Runs one sampling pass for the target given on the command line.
fn run_probe(args: &Args, config: &Config) -> Result<(), ProbeError> {
    let pid = args
        .pid
        .ok_or_else(|| ProbeError::Argument("--pid is required".into()))?;
    let key_prefix = args
        .key_prefix
        .as_deref()
        .ok_or_else(|| ProbeError::Argument("--key-prefix is required".into()))?;

    let uid = nix::unistd::getuid().as_raw();
    let store = FileSnapshotStore::new(config.state_dir(), uid);
    let key = store.key(key_prefix, pid);
    let source = ProcFs::new(config.proc_root());
    let engine = DeltaEngine::new(source, store, config.engine_options());

    let stdout = std::io::stdout();
    let mut emitter = MetricEmitter::new(stdout.lock());
    let now = chrono::Utc::now().timestamp();

    let report = engine.run(&key, &mut emitter, now)?;
    debug!(
        "Pass finished: {:?} baseline, {} metrics",
        report.baseline, report.metrics_emitted
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // --help goes to stdout and is not a failure
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if args.version {
        print!("{}", version_banner());
        return ExitCode::SUCCESS;
    }

    let config = match load_validated_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration invalid: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.check_config {
        println!("✅ Configuration is valid");
        return ExitCode::SUCCESS;
    }

    if args.show_config {
        return match render_config(&config, args.config_format) {
            Ok(output) => {
                println!("{output}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Failed to render configuration: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    setup_logging(config.log_level(&args));
    if let Some(path) = &config.loaded_from {
        info!("Loaded configuration from: {}", path.display());
    }

    match run_probe(&args, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
