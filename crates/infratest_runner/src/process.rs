//! Subprocess runner built on `tokio::process`.
//!
//! Children are spawned with `kill_on_drop`, so dropping the future that
//! awaits a command (task abort, timeout) also terminates the process.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{CommandSpec, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// How long to keep reading a timed-out command's pipes after the kill.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Log output from a running command.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: chrono::DateTime<Utc>,
    pub stream: LogStream,
    pub message: String,
}

/// Log stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Log handler callback type.
pub type LogHandler = Arc<dyn Fn(LogLine) + Send + Sync>;

/// Process runner options.
#[derive(Debug, Clone)]
pub struct ProcessRunnerOptions {
    /// Dry-run mode (log commands without executing)
    pub dry_run: bool,
    /// CI mode (timestamp streamed lines)
    pub ci_mode: bool,
}

impl Default for ProcessRunnerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            ci_mode: std::env::var("CI").is_ok(),
        }
    }
}

impl ProcessRunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn ci_mode(mut self) -> Self {
        self.ci_mode = true;
        self
    }
}

/// Runner that executes commands as local child processes.
pub struct ProcessRunner {
    options: ProcessRunnerOptions,
    log_handler: Option<LogHandler>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(ProcessRunnerOptions::default())
    }
}

impl ProcessRunner {
    pub fn new(options: ProcessRunnerOptions) -> Self {
        Self {
            options,
            log_handler: None,
        }
    }

    /// Set a log handler for streamed output.
    pub fn with_log_handler(mut self, handler: LogHandler) -> Self {
        self.log_handler = Some(handler);
        self
    }

    /// Check if dry-run mode is enabled.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    fn build_command(&self, spec: &CommandSpec) -> RunnerResult<Command> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.workdir {
            if !dir.is_dir() {
                return Err(RunnerError::InvalidWorkdir(dir.display().to_string()));
            }
            cmd.current_dir(dir);
        }

        Ok(cmd)
    }

    /// Spawn a task collecting one output stream into `buffer`, streaming
    /// lines if enabled. Invalid UTF-8 is replaced, never a reason to stop
    /// draining the pipe.
    fn collect_stream<R>(
        &self,
        reader: Option<R>,
        stream: LogStream,
        run_config: &RunConfig,
        buffer: Arc<Mutex<String>>,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let stream_logs = run_config.stream_logs;
        let ci_mode = self.options.ci_mode;
        let log_handler = self.log_handler.clone();

        tokio::spawn(async move {
            let Some(reader) = reader else {
                return;
            };
            let mut reader = BufReader::new(reader);
            let mut raw = Vec::new();
            loop {
                raw.clear();
                match reader.read_until(b'\n', &mut raw).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Stopped reading {}: {}", stream, e);
                        break;
                    }
                }
                let line = String::from_utf8_lossy(&raw)
                    .trim_end_matches(|c: char| c == '\n' || c == '\r')
                    .to_string();
                {
                    let mut output = buffer.lock();
                    output.push_str(&line);
                    output.push('\n');
                }
                if !stream_logs {
                    continue;
                }
                let log_line = LogLine {
                    timestamp: Utc::now(),
                    stream,
                    message: line,
                };
                if ci_mode {
                    println!(
                        "[{}] [{}] {}",
                        log_line.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                        stream,
                        log_line.message
                    );
                } else {
                    match stream {
                        LogStream::Stdout => println!("{}", log_line.message),
                        LogStream::Stderr => eprintln!("{}", log_line.message),
                    }
                }
                if let Some(handler) = &log_handler {
                    handler(log_line);
                }
            }
        })
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn is_available(&self, program: &str) -> RunnerResult<bool> {
        let status = Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        Ok(status.map(|s| s.success()).unwrap_or(false))
    }

    async fn run(
        &self,
        spec: &CommandSpec,
        run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        let command = spec.display();
        debug!(dir = ?spec.workdir, "Executing: {}", command);

        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", command);
            let now = Utc::now();
            return Ok(ExecutionResult {
                command: command.clone(),
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                started_at: now,
                finished_at: now,
                duration_ms: 0,
            });
        }

        let mut cmd = self.build_command(spec)?;
        let mut child = cmd.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: spec.program.clone(),
            message: e.to_string(),
        })?;

        let started_at = Utc::now();
        let stdout = Arc::new(Mutex::new(String::new()));
        let stderr = Arc::new(Mutex::new(String::new()));
        let stdout_task =
            self.collect_stream(child.stdout.take(), LogStream::Stdout, run_config, stdout.clone());
        let stderr_task =
            self.collect_stream(child.stderr.take(), LogStream::Stderr, run_config, stderr.clone());

        let waited = if run_config.timeout_seconds > 0 {
            let timeout = Duration::from_secs(run_config.timeout_seconds);
            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!("Command timed out after {}s: {}", run_config.timeout_seconds, command);
                    if let Err(e) = child.kill().await {
                        error!("Failed to kill timed out process: {}", e);
                    }
                    // Grandchildren may still hold the pipes open.
                    for task in [stdout_task, stderr_task] {
                        let abort = task.abort_handle();
                        if tokio::time::timeout(PIPE_DRAIN_GRACE, task).await.is_err() {
                            abort.abort();
                        }
                    }
                    return Err(RunnerError::Timeout {
                        secs: run_config.timeout_seconds,
                        stdout: stdout.lock().clone(),
                        stderr: stderr.lock().clone(),
                    });
                }
            }
        } else {
            child.wait().await
        };
        let status = waited.map_err(|e| {
            RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
        })?;

        let _ = stdout_task.await;
        let _ = stderr_task.await;
        let stdout = std::mem::take(&mut *stdout.lock());
        let stderr = std::mem::take(&mut *stderr.lock());
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        let exit_code = status.code().map(i64::from).unwrap_or(-1);

        if exit_code == 0 {
            debug!("Command completed successfully in {}ms", duration_ms);
        } else {
            debug!("Command exited with code {} after {}ms", exit_code, duration_ms);
        }

        Ok(ExecutionResult {
            command,
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}
