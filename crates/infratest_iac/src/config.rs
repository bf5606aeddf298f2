//! Terraform driver configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{IacError, IacResult};

/// Transient engine failures worth retrying.
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "read: connection reset by peer",
    "transport is closing",
    "TLS handshake timeout",
    "unable to verify signature",
    "unable to verify checksum",
    "registry service is unreachable",
    "Error installing provider",
    "Failed to query available provider packages",
    "could not query provider registry",
    "Could not retrieve the list of available versions for provider",
    "timeout while waiting for plugin to start",
    "timed out waiting for server handshake",
];

/// Settings shared by every driver instance in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformConfig {
    /// Engine executable
    pub binary: String,
    /// Environment applied to every engine invocation
    pub env: BTreeMap<String, String>,
    /// Timeout for init, apply and output steps (0 = none)
    pub apply_timeout_secs: u64,
    /// Timeout for destroy (0 = none)
    pub destroy_timeout_secs: u64,
    /// Extra attempts for failures matching `retryable_errors`
    pub max_retries: u32,
    pub time_between_retries_secs: u64,
    /// Regex patterns matched against the failed step's output
    pub retryable_errors: Vec<String>,
    /// Pass `-no-color`
    pub no_color: bool,
    /// Pass `-lock=true` to apply and destroy
    pub lock: bool,
    /// Lines of engine output kept in error messages
    pub tail_lines: usize,
    /// Echo engine output while it runs
    pub stream_logs: bool,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
            env: BTreeMap::new(),
            apply_timeout_secs: 3600,
            destroy_timeout_secs: 3600,
            max_retries: 3,
            time_between_retries_secs: 5,
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            no_color: true,
            lock: true,
            tail_lines: 40,
            stream_logs: false,
        }
    }
}

impl TerraformConfig {
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn retries(mut self, max_retries: u32, between_secs: u64) -> Self {
        self.max_retries = max_retries;
        self.time_between_retries_secs = between_secs;
        self
    }

    pub fn no_retries(self) -> Self {
        self.retries(0, 0)
    }

    pub fn tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines;
        self
    }

    pub fn stream_logs(mut self, enabled: bool) -> Self {
        self.stream_logs = enabled;
        self
    }

    pub fn time_between_retries(&self) -> Duration {
        Duration::from_secs(self.time_between_retries_secs)
    }

    /// Compile `retryable_errors`.
    pub fn retry_patterns(&self) -> IacResult<Vec<Regex>> {
        self.retryable_errors
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| IacError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TerraformConfig::default();
        assert_eq!(config.binary, "terraform");
        assert_eq!(config.max_retries, 3);
        assert!(config.no_color);
        assert_eq!(config.retry_patterns().unwrap().len(), DEFAULT_RETRYABLE_ERRORS.len());
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let mut config = TerraformConfig::default();
        config.retryable_errors = vec!["(unclosed".to_string()];

        let err = config.retry_patterns().unwrap_err();
        assert!(matches!(err, IacError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn test_builder() {
        let config = TerraformConfig::default()
            .binary("/opt/bin/tofu")
            .env("AWS_REGION", "eu-west-1")
            .no_retries();

        assert_eq!(config.binary, "/opt/bin/tofu");
        assert_eq!(config.env.get("AWS_REGION"), Some(&"eu-west-1".to_string()));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.time_between_retries(), Duration::ZERO);
    }
}
