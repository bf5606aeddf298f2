//! Error types for IaC module.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::driver::LifecycleStep;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur during IaC operations.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Template directory not found: {0}")]
    TemplateNotFound(PathBuf),

    #[error("Terraform {step} failed (exit code {exit_code}): {message}{}", format_tail(.tail))]
    Provision {
        step: LifecycleStep,
        exit_code: i64,
        message: String,
        tail: String,
    },

    #[error("Terraform destroy failed (exit code {exit_code}): {message}{}", format_tail(.tail))]
    Teardown {
        exit_code: i64,
        message: String,
        tail: String,
    },

    #[error("Output '{name}' is not declared by the template (available: {})", format_names(.available))]
    MissingOutput { name: String, available: Vec<String> },

    #[error("Invalid output JSON: {0}")]
    OutputParse(String),

    #[error("Invalid retryable error pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Workspace isolation failed: {0}")]
    Workspace(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IacError {
    /// Captured engine output tail, if this error carries one.
    pub fn tail(&self) -> Option<&str> {
        match self {
            Self::Provision { tail, .. } | Self::Teardown { tail, .. } if !tail.is_empty() => {
                Some(tail)
            }
            _ => None,
        }
    }

    /// Point a teardown failure at the directory holding the leaked state.
    pub fn with_kept_state(self, dir: &Path) -> Self {
        match self {
            Self::Teardown {
                exit_code,
                message,
                tail,
            } => Self::Teardown {
                exit_code,
                message: format!("{}; state kept in {}", message, dir.display()),
                tail,
            },
            other => other,
        }
    }
}

fn format_tail(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!("\n--- output tail ---\n{}", tail)
    }
}

fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
