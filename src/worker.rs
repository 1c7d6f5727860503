//! Multi-process compilation
//!
//! When several targets are compiled once, each can run in its own worker
//! process. The parent sends a single JSON line to the worker's stdin:
//!
//! ```json
//! {"webpackConfigIndex": 1, "config": { "env": "production", ... }}
//! ```
//!
//! and the worker answers with one JSON line on stdout:
//!
//! ```json
//! {"error": null, "stats": {"target": "target-1", "assets": ["main.js"], ...}}
//! {"error": {"name": "CompileError", "message": "...", "stack": null}}
//! ```
//!
//! Anything the worker prints to stdout before the reply is forwarded to the
//! parent's stdout. Its log lines on stderr are re-logged by the parent at
//! their original level, prefixed with the target label.
//!
//! Workers are the packconf binary itself running the hidden `worker`
//! subcommand; it recomposes every target from the same settings and
//! compiles only the requested index.
//!
//! Tasks run on a rayon pool sized by [`default_concurrency`] and report
//! [`TargetOutcome`]s through an mpsc channel. The first failure cancels the
//! shared [`CancellationToken`], so tasks that have not started yet are
//! skipped instead of launched.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use log::{debug, error, info, warn, Level};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::process;
use crate::runtime::{target_label, CompileStats};
use crate::settings::BuildSettings;

/// Sent to a worker: which target to compile and the shared settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub webpack_config_index: usize,
    pub config: BuildSettings,
}

/// Structured failure reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl WorkerFailure {
    pub fn from_error(error: &Error) -> Self {
        let mut causes = Vec::new();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            causes.push(format!("caused by: {}", cause));
            source = std::error::Error::source(cause);
        }
        Self {
            name: error.kind_name().to_string(),
            message: error.to_string(),
            stack: if causes.is_empty() {
                None
            } else {
                Some(causes.join("\n"))
            },
        }
    }
}

/// A worker's answer; `error` is `null` on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReply {
    pub error: Option<WorkerFailure>,
    /// Compile result of a successful target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<CompileStats>,
}

impl WorkerReply {
    pub fn success(stats: CompileStats) -> Self {
        Self {
            error: None,
            stats: Some(stats),
        }
    }

    pub fn from_result(result: &Result<CompileStats>) -> Self {
        match result {
            Ok(stats) => Self::success(stats.clone()),
            Err(error) => Self {
                error: Some(WorkerFailure::from_error(error)),
                stats: None,
            },
        }
    }

    /// Turn the reply for target `index` back into a result.
    ///
    /// A success without stats yields empty stats for the target.
    pub fn into_result(self, index: usize) -> Result<CompileStats> {
        match self.error {
            None => Ok(self.stats.unwrap_or_else(|| CompileStats {
                target: target_label(index),
                ..Default::default()
            })),
            Some(failure) => Err(Error::Worker {
                index,
                name: failure.name,
                message: failure.message,
                stack: failure.stack,
            }),
        }
    }
}

/// Shared flag telling pending work to stop.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Starts one worker for one request and waits for its reply.
pub trait WorkerLauncher: Send + Sync {
    fn run(&self, request: &WorkerRequest) -> Result<WorkerReply>;
}

/// Launches workers as child processes of `program`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    /// Launcher re-executing the running binary at the current log level.
    pub fn current_exe(cwd: impl Into<PathBuf>) -> Result<Self> {
        let level = log::max_level().to_string().to_lowercase();
        Ok(Self::new(std::env::current_exe()?, cwd)
            .with_args(vec!["--log-level".to_string(), level]))
    }

    /// Arguments placed before the `worker` subcommand.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn run(&self, request: &WorkerRequest) -> Result<WorkerReply> {
        let line = format!("{}\n", serde_json::to_string(request)?);
        let program = self.program.to_string_lossy();
        let mut args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        args.push("worker");

        let index = request.webpack_config_index;
        debug!("Launching worker for target {}", index);
        let output = process::run_child_process(&program, &args, &self.cwd, Some(&line))?;
        relay_logs(index, &output.stderr);

        let (printed, reply) = split_reply(&output.stdout).ok_or_else(|| Error::Worker {
            index,
            name: "ProtocolError".to_string(),
            message: "worker exited without a reply".to_string(),
            stack: None,
        })?;
        if !printed.trim().is_empty() {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", printed.trim_end())?;
        }
        Ok(reply)
    }
}

/// The last line of `stdout` that is a valid reply, with everything printed
/// before it.
fn split_reply(stdout: &str) -> Option<(String, WorkerReply)> {
    let lines: Vec<&str> = stdout.lines().collect();
    lines.iter().enumerate().rev().find_map(|(i, line)| {
        let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
        value.get("error")?;
        serde_json::from_value(value)
            .ok()
            .map(|reply| (lines[..i].join("\n"), reply))
    })
}

/// Split an `env_logger` line (`[WARN  module] message`) into its level and
/// message. Other lines are treated as info.
fn classify_log_line(line: &str) -> (Level, &str) {
    let parsed = line.strip_prefix('[').and_then(|rest| {
        let (header, message) = rest.split_once("] ")?;
        let level = header.split_whitespace().next()?.parse::<Level>().ok()?;
        Some((level, message))
    });
    parsed.unwrap_or((Level::Info, line))
}

/// Re-log a worker's stderr under the parent's logger.
fn relay_logs(index: usize, stderr: &str) {
    let label = target_label(index);
    for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
        match classify_log_line(line) {
            (Level::Error, message) => error!("[{}] {}", label, message),
            (Level::Warn, message) => warn!("[{}] {}", label, message),
            (Level::Info, message) => info!("[{}] {}", label, message),
            (_, message) => debug!("[{}] {}", label, message),
        }
    }
}

/// Result of one target in the pool.
#[derive(Debug)]
pub enum TargetOutcome {
    Succeeded { index: usize, stats: CompileStats },
    Failed { index: usize, error: Error },
    /// Skipped because another target failed first
    Cancelled { index: usize },
}

impl TargetOutcome {
    pub fn index(&self) -> usize {
        match self {
            TargetOutcome::Succeeded { index, .. }
            | TargetOutcome::Failed { index, .. }
            | TargetOutcome::Cancelled { index } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TargetOutcome::Succeeded { .. })
    }
}

/// Called as each outcome arrives.
pub type OutcomeCallback<'a> = &'a (dyn Fn(&TargetOutcome) + Sync);

/// Half the logical cores, at least one.
pub fn default_concurrency() -> usize {
    (thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        / 2)
        .max(1)
}

fn run_task(
    launcher: &dyn WorkerLauncher,
    settings: &BuildSettings,
    index: usize,
    token: &CancellationToken,
) -> TargetOutcome {
    if token.is_cancelled() {
        debug!("Skipping target {}: cancelled", index);
        return TargetOutcome::Cancelled { index };
    }
    let request = WorkerRequest {
        webpack_config_index: index,
        config: settings.clone(),
    };
    match launcher
        .run(&request)
        .and_then(|reply| reply.into_result(index))
    {
        Ok(stats) => {
            info!("Target {} compiled", index);
            TargetOutcome::Succeeded { index, stats }
        }
        Err(error) => {
            warn!("Target {} failed: {}", index, error);
            token.cancel();
            TargetOutcome::Failed { index, error }
        }
    }
}

/// Compile targets `0..count` in workers, `concurrency` at a time.
///
/// Outcomes are returned sorted by target index.
pub fn run_workers(
    launcher: &dyn WorkerLauncher,
    settings: &BuildSettings,
    count: usize,
    concurrency: usize,
    token: &CancellationToken,
    on_outcome: Option<OutcomeCallback<'_>>,
) -> Result<Vec<TargetOutcome>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .thread_name(|i| format!("packconf-worker-{}", i))
        .build()
        .map_err(|e| Error::Config {
            message: format!("failed to start worker pool: {}", e),
        })?;
    info!(
        "Compiling {} target(s) with {} worker(s)",
        count,
        concurrency.max(1)
    );

    let (tx, rx) = mpsc::channel();
    let mut outcomes = thread::scope(|s| {
        s.spawn(move || {
            pool.scope(|scope| {
                for index in 0..count {
                    let tx = tx.clone();
                    scope.spawn(move |_| {
                        let outcome = run_task(launcher, settings, index, token);
                        let _ = tx.send(outcome);
                    });
                }
            });
        });

        let mut outcomes = Vec::with_capacity(count);
        for outcome in rx {
            if let Some(callback) = on_outcome {
                callback(&outcome);
            }
            outcomes.push(outcome);
        }
        outcomes
    });

    outcomes.sort_by_key(TargetOutcome::index);
    Ok(outcomes)
}

/// Collapse outcomes into the stats of every target, or one error listing
/// every target that did not succeed.
pub fn aggregate(outcomes: Vec<TargetOutcome>) -> Result<Vec<CompileStats>> {
    let total = outcomes.len();
    let mut stats = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            TargetOutcome::Succeeded { stats: target, .. } => stats.push(target),
            TargetOutcome::Failed { index, error } => {
                failures.push(format!("target {}: {}", index, error))
            }
            TargetOutcome::Cancelled { index } => {
                failures.push(format!("target {}: {}", index, Error::Cancelled))
            }
        }
    }

    if failures.is_empty() {
        Ok(stats)
    } else {
        Err(Error::Workers { total, failures })
    }
}

/// Worker side of the protocol: read one request, run it, write the reply.
///
/// Failures of `runner` are sent back as a reply rather than returned.
pub fn serve_worker<R, W, F>(reader: R, mut writer: W, runner: F) -> Result<()>
where
    R: BufRead,
    W: Write,
    F: FnOnce(&WorkerRequest) -> Result<CompileStats>,
{
    let mut line = String::new();
    let mut reader = reader;
    reader.read_line(&mut line)?;
    let request: WorkerRequest = serde_json::from_str(line.trim())?;
    debug!("Worker received target {}", request.webpack_config_index);

    let result = runner(&request);
    let reply = WorkerReply::from_result(&result);
    writeln!(writer, "{}", serde_json::to_string(&reply)?)?;
    writer.flush()?;
    Ok(())
}
