//! Command runner trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CommandSpec, RunConfig};
use crate::error::RunnerResult;

/// Result of a command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Rendered command line
    pub command: String,
    /// Exit code (-1 if the process was killed by a signal)
    pub exit_code: i64,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Execution end time
    pub finished_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        combine_output(&self.stdout, &self.stderr)
    }

    /// Last `lines` lines of the combined output.
    pub fn tail(&self, lines: usize) -> String {
        tail_lines(&self.combined_output(), lines)
    }
}

/// Stdout followed by stderr.
pub fn combine_output(stdout: &str, stderr: &str) -> String {
    if stdout.is_empty() {
        stderr.to_string()
    } else if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{}\n{}", stdout.trim_end(), stderr)
    }
}

/// Keep only the last `lines` lines of `text`.
pub fn tail_lines(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// Command runner trait.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Check if a program can be executed.
    async fn is_available(&self, program: &str) -> RunnerResult<bool>;

    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit code is not an error at this layer; callers inspect
    /// [`ExecutionResult::success`].
    async fn run(&self, spec: &CommandSpec, run_config: &RunConfig)
        -> RunnerResult<ExecutionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stdout: &str, stderr: &str, exit_code: i64) -> ExecutionResult {
        ExecutionResult {
            command: "terraform apply".to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 0,
        }
    }

    #[test]
    fn test_combined_output() {
        assert_eq!(result("out", "", 0).combined_output(), "out");
        assert_eq!(result("", "err", 1).combined_output(), "err");
        assert_eq!(result("out\n", "err", 1).combined_output(), "out\nerr");
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let r = result("one\ntwo\nthree", "four", 1);
        assert_eq!(r.tail(2), "three\nfour");
        assert_eq!(r.tail(10), "one\ntwo\nthree\nfour");
        assert!(!r.success());
    }
}
