//! Error types for the harness.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use infratest_iac::IacError;

use crate::session::SessionState;

/// Result type alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can fail a test case or a run.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Iac(#[from] IacError),

    #[error("Assertion failed for output '{output}': {message}")]
    Assertion { output: String, message: String },

    #[error("Test body panicked: {0}")]
    Panicked(String),

    #[error("Invalid session state: expected {expected}, found {found}")]
    InvalidState {
        expected: SessionState,
        found: SessionState,
    },

    #[error("Template directory {0:?} is used by more than one case; enable workspace isolation")]
    SharedWorkspace(PathBuf),

    #[error("Duplicate test case name: {0}")]
    DuplicateCase(String),

    #[error("Test case cancelled before completion")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Suite error: {0}")]
    Suite(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl HarnessError {
    pub fn assertion(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Assertion {
            output: output.into(),
            message: message.into(),
        }
    }

    /// Classify for reporting and exit codes.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Iac(e) => FailureKind::of_iac(e),
            Self::Assertion { .. } => FailureKind::Assertion,
            Self::Panicked(_) => FailureKind::Panic,
            Self::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Other,
        }
    }
}

/// Failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Assertion,
    MissingOutput,
    Panic,
    Other,
    Cancelled,
    Provision,
    Teardown,
}

impl FailureKind {
    /// Classify a lifecycle error.
    pub fn of_iac(error: &IacError) -> Self {
        match error {
            IacError::Teardown { .. } => Self::Teardown,
            IacError::MissingOutput { .. } => Self::MissingOutput,
            IacError::Provision { .. }
            | IacError::TemplateNotFound(_)
            | IacError::Workspace(_)
            | IacError::OutputParse(_) => Self::Provision,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Assertion => "assertion",
            Self::MissingOutput => "missing output",
            Self::Panic => "panic",
            Self::Other => "error",
            Self::Cancelled => "cancelled",
            Self::Provision => "provision",
            Self::Teardown => "teardown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infratest_iac::LifecycleStep;

    #[test]
    fn test_kind_classification() {
        let provision = HarnessError::from(IacError::Provision {
            step: LifecycleStep::Init,
            exit_code: 1,
            message: "exited with code 1".into(),
            tail: String::new(),
        });
        assert_eq!(provision.kind(), FailureKind::Provision);

        let teardown = HarnessError::from(IacError::Teardown {
            exit_code: 1,
            message: "exited with code 1".into(),
            tail: String::new(),
        });
        assert_eq!(teardown.kind(), FailureKind::Teardown);

        let missing = HarnessError::from(IacError::MissingOutput {
            name: "x".into(),
            available: vec![],
        });
        assert_eq!(missing.kind(), FailureKind::MissingOutput);

        assert_eq!(HarnessError::assertion("x", "empty").kind(), FailureKind::Assertion);
    }

    #[test]
    fn test_severity_order() {
        // Teardown outranks every other failure kind.
        assert!(FailureKind::Teardown > FailureKind::Provision);
        assert!(FailureKind::Provision > FailureKind::Assertion);
        assert!(FailureKind::MissingOutput > FailureKind::Assertion);
    }
}
