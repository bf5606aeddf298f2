//! Error types for the runner module.

use thiserror::Error;

use crate::runner::combine_output;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while running a command.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Program not available: {0}")]
    ProgramNotAvailable(String),

    #[error("Failed to spawn {program}: {message}")]
    SpawnFailed { program: String, message: String },

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Command timeout after {secs} seconds")]
    Timeout {
        secs: u64,
        /// Output captured before the command was killed
        stdout: String,
        stderr: String,
    },

    #[error("Invalid working directory: {0}")]
    InvalidWorkdir(String),
}

impl RunnerError {
    /// Output the command produced before failing, if any was captured.
    pub fn partial_output(&self) -> Option<String> {
        match self {
            Self::Timeout { stdout, stderr, .. } if !(stdout.is_empty() && stderr.is_empty()) => {
                Some(combine_output(stdout, stderr))
            }
            _ => None,
        }
    }
}
