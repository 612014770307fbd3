//! End-to-end tests for the process-status binary.
//!
//! Each test builds a fake proc tree in a temp directory and runs the binary
//! against it with `--proc-root`, keeping snapshots in a private `--state-dir`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::{tempdir, TempDir};

const PID: u32 = 321;

struct FakeProc {
    _dir: TempDir,
    proc_root: PathBuf,
    state_dir: PathBuf,
}

impl FakeProc {
    fn new() -> Self {
        let dir = tempdir().expect("Failed to create temp dir");
        let proc_root = dir.path().join("proc");
        let state_dir = dir.path().join("state");
        let pid_dir = proc_root.join(PID.to_string());
        fs::create_dir_all(pid_dir.join("fd")).unwrap();
        fs::create_dir_all(&state_dir).unwrap();

        for fd in 0..4 {
            fs::write(pid_dir.join("fd").join(fd.to_string()), "").unwrap();
        }
        fs::write(
            pid_dir.join("limits"),
            "Limit                     Soft Limit           Hard Limit           Units\n\
             Max open files            1024                 4096                 files\n",
        )
        .unwrap();
        fs::write(pid_dir.join("status"), "Name:\tworker\nVmRSS:\t    2048 kB\n").unwrap();
        fs::write(proc_root.join("meminfo"), "MemTotal:        8192 kB\n").unwrap();

        let fake = Self {
            _dir: dir,
            proc_root,
            state_dir,
        };
        fake.set_counters(1000, 30, 20);
        fake
    }

    /// Rewrites /proc/stat and /proc/<pid>/stat. `system` is spread over the
    /// user and idle fields.
    fn set_counters(&self, system: u64, utime: u64, stime: u64) {
        let user = system / 4;
        let idle = system - user;
        fs::write(
            self.proc_root.join("stat"),
            format!("cpu  {user} 0 0 {idle} 0 0 0 0 0 0\ncpu0 {user} 0 0 {idle} 0 0 0 0 0 0\n"),
        )
        .unwrap();
        fs::write(
            self.proc_root.join(PID.to_string()).join("stat"),
            format!(
                "{PID} (worker) S 1 {PID} {PID} 0 -1 4194304 0 0 0 0 {utime} {stime} 0 0 20 0 1 0 5555 1000000 512 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0"
            ),
        )
        .unwrap();
    }

    fn run(&self, extra: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_process-status"))
            .arg("--no-config")
            .arg("--proc-root")
            .arg(&self.proc_root)
            .arg("--state-dir")
            .arg(&self.state_dir)
            .args(extra)
            .output()
            .expect("Failed to run process-status")
    }

    fn probe(&self) -> Output {
        self.run(&["--pid", &PID.to_string(), "--key-prefix", "worker"])
    }

    fn snapshot_files(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.state_dir)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .collect()
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn is_metric_line(line: &str) -> bool {
    let fields: Vec<&str> = line.split('\t').collect();
    fields.len() == 3
        && fields[0].starts_with("process-status.")
        && fields[1].parse::<f64>().map(f64::is_finite).unwrap_or(false)
        && fields[2].parse::<i64>().is_ok()
}

#[test]
fn test_first_run_notice_and_exit_zero() {
    let fake = FakeProc::new();

    let out = fake.probe();

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    let metrics = stdout(&out);
    assert!(metrics.lines().all(is_metric_line), "{}", metrics);
    assert!(!metrics.contains(".cpu_"));
    assert!(metrics.contains("process-status.fds_worker.count\t4\t"));
    assert!(metrics.contains("process-status.mem_worker.used\t2097152\t"));
    assert!(stderr(&out).contains("first execution"));
    assert_eq!(fake.snapshot_files().len(), 1);
}

#[test]
fn test_second_run_emits_cpu_percentage() {
    let fake = FakeProc::new();
    assert_eq!(fake.probe().status.code(), Some(0));

    fake.set_counters(1200, 45, 25);
    let out = fake.probe();

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    let metrics = stdout(&out);
    assert!(metrics.lines().all(is_metric_line), "{}", metrics);
    assert_eq!(
        metrics
            .lines()
            .filter(|l| l.starts_with("process-status.cpu_worker.percentage\t"))
            .count(),
        1
    );
    assert!(metrics.contains("process-status.cpu_worker.percentage\t10.000000\t"));
}

#[test]
fn test_unchanged_counters_exit_one_without_bad_lines() {
    let fake = FakeProc::new();
    assert_eq!(fake.probe().status.code(), Some(0));

    let out = fake.probe();

    assert_eq!(out.status.code(), Some(1));
    let metrics = stdout(&out);
    assert!(metrics.lines().all(is_metric_line), "{}", metrics);
    assert!(!metrics.contains(".cpu_"));
    assert!(stderr(&out).contains("invalid interval"));
}

#[test]
fn test_corrupt_snapshot_exit_one_then_recovers() {
    let fake = FakeProc::new();
    assert_eq!(fake.probe().status.code(), Some(0));
    let files = fake.snapshot_files();
    fs::write(&files[0], "{garbage").unwrap();

    let out = fake.probe();
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("failed to parse snapshot"));

    fake.set_counters(1200, 45, 25);
    let out = fake.probe();
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains(".cpu_worker.percentage"));
}

#[test]
fn test_missing_process_exit_one() {
    let fake = FakeProc::new();

    let out = fake.run(&["--pid", "99999", "--key-prefix", "worker"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(stdout(&out).is_empty());
    assert!(stderr(&out).contains("process 99999 not found"));
    assert!(fake.snapshot_files().is_empty());
}

#[test]
fn test_argument_errors_exit_one() {
    let fake = FakeProc::new();

    assert_eq!(fake.run(&["--key-prefix", "worker"]).status.code(), Some(1));
    assert_eq!(fake.run(&["--pid", "1"]).status.code(), Some(1));
    assert_eq!(
        fake.run(&["--pid", "nope", "--key-prefix", "worker"]).status.code(),
        Some(1)
    );
}

#[test]
fn test_version_prints_banner_without_sampling() {
    let fake = FakeProc::new();

    let out = fake.run(&["--version"]);

    assert_eq!(out.status.code(), Some(0));
    let banner = stdout(&out);
    assert!(banner.starts_with("process-status "));
    assert!(banner.contains("Compiler: rustc"));
    assert!(fake.snapshot_files().is_empty());
}

#[test]
fn test_check_config_with_invalid_file() {
    let fake = FakeProc::new();
    let cfg = fake.state_dir.join("bad.yaml");
    fs::write(&cfg, "namespace: \"has space\"\n").unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_process-status"))
        .arg("--config")
        .arg(&cfg)
        .arg("--check-config")
        .output()
        .expect("Failed to run process-status");

    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Configuration invalid"));
}

#[test]
fn test_show_config_json() {
    let fake = FakeProc::new();

    let out = fake.run(&["--show-config", "--config-format", "json", "--cpu-mode", "self"]);

    assert_eq!(out.status.code(), Some(0));
    let value: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(value["cpu_mode"], "self");
    assert_eq!(
        Path::new(value["proc_root"].as_str().unwrap()),
        fake.proc_root.as_path()
    );
}

#[test]
fn test_config_file_source_is_logged() {
    let fake = FakeProc::new();
    let cfg = fake.state_dir.join("probe.yaml");
    fs::write(&cfg, "namespace: custom\n").unwrap();
    let pid = PID.to_string();

    let out = Command::new(env!("CARGO_BIN_EXE_process-status"))
        .arg("--config")
        .arg(&cfg)
        .arg("--proc-root")
        .arg(&fake.proc_root)
        .arg("--state-dir")
        .arg(&fake.state_dir)
        .args(["--pid", pid.as_str(), "--key-prefix", "worker"])
        .output()
        .expect("Failed to run process-status");

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("Loaded configuration from"));
    assert!(stdout(&out).contains("custom.fds_worker.count\t4\t"));
}
