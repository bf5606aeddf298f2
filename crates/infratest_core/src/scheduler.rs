//! Parallel test scheduler.
//!
//! Every case runs as its own task inside a [`Session`](crate::Session)
//! scope; a semaphore bounds how many provision at once. Cases share only
//! the read-only driver and configuration.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use infratest_iac::{ApplyResult, LifecycleDriver, TemplateHandle};

use crate::assertion::{check_all, Assertion};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::report::{CaseReport, SuiteReport};
use crate::session::{panic_message, run_session, GuardReport};

/// Body of a test case: receives the apply result, returns pass or fail.
pub type CaseBody = Box<dyn FnOnce(ApplyResult) -> BoxFuture<'static, HarnessResult<()>> + Send>;

/// A named template handle plus what to check once it is applied.
pub struct TestCase {
    pub name: String,
    pub handle: TemplateHandle,
    body: CaseBody,
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl TestCase {
    pub fn new<F, Fut>(name: impl Into<String>, handle: TemplateHandle, body: F) -> Self
    where
        F: FnOnce(ApplyResult) -> Fut + Send + 'static,
        Fut: Future<Output = HarnessResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            handle,
            body: Box::new(move |applied| body(applied).boxed()),
        }
    }

    /// A case whose body checks `assertions` against the outputs in order.
    pub fn with_assertions(
        name: impl Into<String>,
        handle: TemplateHandle,
        assertions: Vec<Assertion>,
    ) -> Self {
        Self::new(name, handle, move |applied| async move {
            check_all(&assertions, &applied.outputs)
        })
    }
}

/// Runs test cases concurrently, each in its own scoped session.
pub struct Scheduler {
    driver: Arc<dyn LifecycleDriver>,
    config: Arc<HarnessConfig>,
    cases: Vec<TestCase>,
}

impl Scheduler {
    pub fn new(driver: Arc<dyn LifecycleDriver>, config: Arc<HarnessConfig>) -> Self {
        Self {
            driver,
            config,
            cases: Vec::new(),
        }
    }

    pub fn add(&mut self, case: TestCase) -> &mut Self {
        self.cases.push(case);
        self
    }

    pub fn extend(&mut self, cases: impl IntoIterator<Item = TestCase>) -> &mut Self {
        self.cases.extend(cases);
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Reject an invalid configuration, duplicate names and, without isolation, cases that would
    /// share a template directory.
    pub fn check(&self) -> HarnessResult<()> {
        self.config.validate()?;

        let mut names = HashSet::new();
        for case in &self.cases {
            if !names.insert(case.name.as_str()) {
                return Err(HarnessError::DuplicateCase(case.name.clone()));
            }
        }

        if !self.config.isolate_workspaces {
            let mut roots = HashSet::new();
            for case in &self.cases {
                let root = fs::canonicalize(case.handle.root())
                    .unwrap_or_else(|_| case.handle.root().to_path_buf());
                if !roots.insert(root.clone()) {
                    return Err(HarnessError::SharedWorkspace(root));
                }
            }
        }
        Ok(())
    }

    /// Run every case to completion.
    pub async fn run(self) -> HarnessResult<SuiteReport> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run every case, stopping early when `shutdown` completes.
    ///
    /// On shutdown, in-flight tasks are aborted; dropping their sessions
    /// runs the pending teardowns before this returns. Cases that did not
    /// finish are reported as cancelled.
    pub async fn run_until<S>(self, shutdown: S) -> HarnessResult<SuiteReport>
    where
        S: Future<Output = ()>,
    {
        self.check()?;

        let started_at = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let order: Vec<(String, PathBuf, GuardReport)> = self
            .cases
            .iter()
            .map(|c| (c.name.clone(), c.handle.root().to_path_buf(), GuardReport::new()))
            .collect();

        info!(
            cases = order.len(),
            max_parallel = self.config.max_parallel,
            isolate = self.config.isolate_workspaces,
            "Starting test run"
        );

        let mut tasks = JoinSet::new();
        for (case, (_, _, guard)) in self.cases.into_iter().zip(&order) {
            let driver = self.driver.clone();
            let config = self.config.clone();
            let semaphore = semaphore.clone();
            let guard = guard.clone();
            tasks.spawn(async move {
                let name = case.name.clone();
                let template = case.handle.root().to_path_buf();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return CaseReport::cancelled(name, template),
                };
                match AssertUnwindSafe(run_case(driver, config, case, guard))
                    .catch_unwind()
                    .await
                {
                    Ok(report) => report,
                    Err(panic) => {
                        let e = HarnessError::Panicked(panic_message(panic.as_ref()));
                        error!(case = %name, "Case task panicked: {}", e);
                        CaseReport::failed(name, template, &e)
                    }
                }
            });
        }

        let mut finished: HashMap<String, CaseReport> = HashMap::new();
        let mut cancelled = false;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(report)) => {
                        finished.insert(report.name.clone(), report);
                    }
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => error!("Case task failed: {}", e),
                },
                _ = &mut shutdown, if !cancelled => {
                    warn!(
                        remaining = tasks.len(),
                        "Shutdown requested, aborting running cases"
                    );
                    cancelled = true;
                    tasks.abort_all();
                }
            }
        }

        // Aborted sessions report their guard teardown here.
        let cases = order
            .into_iter()
            .map(|(name, template, guard)| {
                let mut report = finished
                    .remove(&name)
                    .unwrap_or_else(|| CaseReport::cancelled(name, template));
                if let Some(e) = guard.take() {
                    report.record(&e);
                }
                report
            })
            .collect();

        let report = SuiteReport {
            started_at,
            finished_at: Utc::now(),
            cancelled,
            cases,
        };
        info!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            cancelled,
            "Test run finished"
        );
        Ok(report)
    }
}

async fn run_case(
    driver: Arc<dyn LifecycleDriver>,
    config: Arc<HarnessConfig>,
    case: TestCase,
    guard: GuardReport,
) -> CaseReport {
    let TestCase { name, handle, body } = case;
    let template = handle.root().to_path_buf();
    info!(case = %name, "Running case against {:?}", template);

    let options = config.session_options(&name).report_guard_to(guard);
    let outcome = run_session(driver, handle, options, body).await;
    let report = CaseReport::from_outcome(template, &outcome);

    if report.passed {
        info!(case = %name, duration_ms = report.duration_ms, "Case passed");
    } else {
        for failure in &report.failures {
            error!(case = %name, kind = %failure.kind, "{}", failure.message);
        }
    }
    report
}
