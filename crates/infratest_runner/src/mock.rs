//! Scripted command runner.
//!
//! [`MockRunner`] stands in for the provisioning engine in tests: it records
//! every command it is asked to run and answers from a script instead of
//! spawning anything.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

use crate::config::{CommandSpec, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Canned result for one scripted call.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    /// Exit 0 with `stdout`.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::exited(0, stdout.into(), String::new())
    }

    /// Non-zero exit with `stderr`.
    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self::exited(exit_code, String::new(), stderr.into())
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    fn exited(exit_code: i64, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration_ms: 100,
        }
    }

    fn into_result(self, spec: &CommandSpec) -> ExecutionResult {
        let started_at = Utc::now();
        ExecutionResult {
            command: spec.display(),
            exit_code: self.exit_code,
            stdout: self.stdout,
            stderr: self.stderr,
            started_at,
            finished_at: started_at + Duration::milliseconds(self.duration_ms as i64),
            duration_ms: self.duration_ms,
        }
    }
}

/// A command the mock was asked to run.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CapturedCall {
    /// First argument of the call.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }
}

#[derive(Default)]
struct Script {
    keyed: HashMap<String, VecDeque<MockResponse>>,
    sequence: Vec<MockResponse>,
    cursor: usize,
    spawn_error: Option<String>,
    calls: Vec<CapturedCall>,
}

impl Script {
    /// Keyed queue first (its last entry repeats), then the shared
    /// sequence round-robin, then an empty success.
    fn next(&mut self, subcommand: Option<&str>) -> MockResponse {
        if let Some(queue) = subcommand.and_then(|sub| self.keyed.get_mut(sub)) {
            let response = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(response) = response {
                return response;
            }
        }

        if self.sequence.is_empty() {
            return MockResponse::success("");
        }
        let response = self.sequence[self.cursor % self.sequence.len()].clone();
        self.cursor += 1;
        response
    }
}

/// In-memory [`CommandRunner`] answering from a script.
///
/// Clones share the same script and call log, so a test can keep one clone
/// for inspection and hand another to the code under test.
#[derive(Clone)]
pub struct MockRunner {
    script: Arc<Mutex<Script>>,
    available: bool,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            available: true,
        }
    }

    /// What `is_available` reports for every program.
    pub fn set_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Queue a response for calls whose first argument is `subcommand`.
    pub fn on(self, subcommand: impl Into<String>, response: MockResponse) -> Self {
        self.script
            .lock()
            .keyed
            .entry(subcommand.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Append to the sequence used for calls with no keyed response.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.script.lock().sequence.push(response);
        self
    }

    /// Replace the sequence used for calls with no keyed response.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        {
            let mut script = self.script.lock();
            script.sequence = responses;
            script.cursor = 0;
        }
        self
    }

    /// Make every call fail as if the program could not be run.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        self.script.lock().spawn_error = Some(message.into());
        self
    }

    pub fn clear_calls(&self) {
        self.script.lock().calls.clear();
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.script.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().calls.len()
    }

    pub fn was_called(&self, subcommand: &str) -> bool {
        self.script
            .lock()
            .calls
            .iter()
            .any(|c| c.subcommand() == Some(subcommand))
    }

    /// Calls whose first argument is `subcommand`, in order.
    pub fn get_subcommand_calls(&self, subcommand: &str) -> Vec<CapturedCall> {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|c| c.subcommand() == Some(subcommand))
            .cloned()
            .collect()
    }

    /// Subcommands in call order.
    pub fn subcommands(&self) -> Vec<String> {
        self.script
            .lock()
            .calls
            .iter()
            .filter_map(|c| c.subcommand().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn is_available(&self, _program: &str) -> RunnerResult<bool> {
        Ok(self.available)
    }

    async fn run(
        &self,
        spec: &CommandSpec,
        _run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        let mut script = self.script.lock();
        script.calls.push(CapturedCall {
            program: spec.program.clone(),
            args: spec.args.clone(),
            workdir: spec.workdir.clone(),
            env: spec.env.clone(),
        });

        if let Some(message) = &script.spawn_error {
            return Err(RunnerError::ExecutionFailed(message.clone()));
        }
        Ok(script.next(spec.subcommand()).into_result(spec))
    }
}
