//! Per-case and per-run results.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, HarnessError};
use crate::session::{SessionOutcome, SessionState};

/// One failure of a case, flattened for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&HarnessError> for FailureRecord {
    fn from(error: &HarnessError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Result of one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    /// Template directory as given by the case (before isolation)
    pub template: PathBuf,
    pub passed: bool,
    /// Final session state; `None` if the case never reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionState>,
    pub failures: Vec<FailureRecord>,
    pub duration_ms: u64,
}

impl CaseReport {
    pub fn from_outcome(template: impl Into<PathBuf>, outcome: &SessionOutcome<()>) -> Self {
        Self {
            name: outcome.name.clone(),
            template: template.into(),
            passed: outcome.passed(),
            state: Some(outcome.state),
            failures: outcome.failures.iter().map(FailureRecord::from).collect(),
            duration_ms: outcome.duration.as_millis() as u64,
        }
    }

    /// A case that failed outside its session.
    pub fn failed(name: impl Into<String>, template: impl Into<PathBuf>, error: &HarnessError) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            passed: false,
            state: None,
            failures: vec![FailureRecord::from(error)],
            duration_ms: 0,
        }
    }

    pub fn cancelled(name: impl Into<String>, template: impl Into<PathBuf>) -> Self {
        Self::failed(name, template, &HarnessError::Cancelled)
    }

    /// Append a failure that happened after the case reported, such as a
    /// drop-guard teardown.
    pub fn record(&mut self, error: &HarnessError) {
        self.passed = false;
        if error.kind() == FailureKind::Teardown {
            self.state = Some(SessionState::Failed);
        }
        self.failures.push(FailureRecord::from(error));
    }

    /// Most severe failure kind of this case.
    pub fn worst_kind(&self) -> Option<FailureKind> {
        self.failures.iter().map(|f| f.kind).max()
    }
}

/// Result of a whole run, cases in submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Whether the run was interrupted before every case finished
    pub cancelled: bool,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        !self.cancelled && self.cases.iter().all(|c| c.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.cases.len() - self.passed_count()
    }

    /// Most severe failure kind across all cases.
    pub fn worst_kind(&self) -> Option<FailureKind> {
        self.cases.iter().filter_map(CaseReport::worst_kind).max()
    }

    pub fn case(&self, name: &str) -> Option<&CaseReport> {
        self.cases.iter().find(|c| c.name == name)
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }
}
