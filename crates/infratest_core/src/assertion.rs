//! Assertions against resolved outputs.

use regex::Regex;
use serde::{Deserialize, Serialize};

use infratest_iac::{ApplyResult, Outputs};

use crate::error::{HarnessError, HarnessResult};

/// A check on one named output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    /// The output is declared (any value, including empty)
    Present(String),
    /// The output is declared and not empty
    NotEmpty(String),
    /// The output, coerced to a string, equals `expected`
    Equals { output: String, expected: String },
    /// The output, coerced to a string, contains `needle`
    Contains { output: String, needle: String },
    /// The output, coerced to a string, matches `pattern`
    Matches { output: String, pattern: String },
}

impl Assertion {
    pub fn output(&self) -> &str {
        match self {
            Self::Present(output) | Self::NotEmpty(output) => output,
            Self::Equals { output, .. }
            | Self::Contains { output, .. }
            | Self::Matches { output, .. } => output,
        }
    }

    /// Reject assertions that could never be checked, before anything is
    /// provisioned.
    pub fn validate(&self) -> HarnessResult<()> {
        match self {
            Self::Matches { pattern, .. } => compile(pattern).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Check against the outputs. A missing output fails with
    /// `MissingOutput`, never as an assertion on an empty value.
    pub fn check(&self, outputs: &Outputs) -> HarnessResult<()> {
        let name = self.output();
        let value = outputs.get(name)?;
        let shown = outputs.redacted(name);

        match self {
            Self::Present(_) => Ok(()),
            Self::NotEmpty(_) => {
                if value.is_empty() {
                    Err(HarnessError::assertion(name, "expected a non-empty value"))
                } else {
                    Ok(())
                }
            }
            Self::Equals { expected, .. } => {
                if value.to_plain_string() == *expected {
                    Ok(())
                } else {
                    Err(HarnessError::assertion(
                        name,
                        format!("expected '{}', got '{}'", expected, shown),
                    ))
                }
            }
            Self::Contains { needle, .. } => {
                let contained = match value.as_list() {
                    Some(items) => items.iter().any(|item| item == needle),
                    None => value.to_plain_string().contains(needle.as_str()),
                };
                if contained {
                    Ok(())
                } else {
                    Err(HarnessError::assertion(
                        name,
                        format!("expected '{}' to contain '{}'", shown, needle),
                    ))
                }
            }
            Self::Matches { pattern, .. } => {
                let re = compile(pattern)?;
                if re.is_match(&value.to_plain_string()) {
                    Ok(())
                } else {
                    Err(HarnessError::assertion(
                        name,
                        format!("'{}' does not match /{}/", shown, pattern),
                    ))
                }
            }
        }
    }
}

fn compile(pattern: &str) -> HarnessResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| HarnessError::Config(format!("invalid pattern '{}': {}", pattern, e)))
}

/// Check every assertion, stopping at the first failure.
pub fn check_all(assertions: &[Assertion], outputs: &Outputs) -> HarnessResult<()> {
    assertions.iter().try_for_each(|a| a.check(outputs))
}

/// Resolve `name` and require a non-empty value; returns it as a string.
pub fn require_non_empty(applied: &ApplyResult, name: &str) -> HarnessResult<String> {
    Assertion::NotEmpty(name.to_string()).check(&applied.outputs)?;
    Ok(applied.output_string(name)?)
}

/// Declarative form of the assertions on one output, as written in suite files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub output: String,
    #[serde(default)]
    pub not_empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
}

impl Expectation {
    /// Expand into assertions; with no checks set, only presence is required.
    pub fn assertions(&self) -> Vec<Assertion> {
        let output = self.output.clone();
        let mut assertions = Vec::new();
        if self.not_empty {
            assertions.push(Assertion::NotEmpty(output.clone()));
        }
        if let Some(expected) = &self.equals {
            assertions.push(Assertion::Equals {
                output: output.clone(),
                expected: expected.clone(),
            });
        }
        if let Some(needle) = &self.contains {
            assertions.push(Assertion::Contains {
                output: output.clone(),
                needle: needle.clone(),
            });
        }
        if let Some(pattern) = &self.matches {
            assertions.push(Assertion::Matches {
                output: output.clone(),
                pattern: pattern.clone(),
            });
        }
        if assertions.is_empty() {
            assertions.push(Assertion::Present(output));
        }
        assertions
    }
}
