//! Scoped test sessions.
//!
//! A [`Session`] owns one template handle's provisioned resources. Once an
//! apply has been attempted, teardown is owed: it is paid either by an
//! explicit [`Session::destroy`] or, if the session is dropped first (task
//! aborted, future cancelled, panic unwinding), by the drop guard, which runs
//! the destroy synchronously on a dedicated thread.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use infratest_iac::{
    ApplyResult, IacError, IacResult, IsolatedWorkspace, LifecycleDriver, OutputValue,
    TemplateHandle,
};

use crate::error::{HarnessError, HarnessResult};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Applied,
    Destroyed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Applied => "applied",
            Self::Destroyed => "destroyed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Receives the error of a teardown run by the drop guard.
///
/// The guard has no caller to return a `Result` to. Whoever creates the
/// session keeps a clone and reads it once the session is gone.
#[derive(Debug, Clone, Default)]
pub struct GuardReport(Arc<Mutex<Option<HarnessError>>>);

impl GuardReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, error: HarnessError) {
        *self.0.lock() = Some(error);
    }

    /// The guard teardown failure, if there was one.
    pub fn take(&self) -> Option<HarnessError> {
        self.0.lock().take()
    }
}

/// How a session prepares its working directory.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Name used in logs
    pub name: Option<String>,
    /// Copy the template into a private directory before applying
    pub isolate: bool,
    /// Parent for isolated copies (system temp dir when `None`)
    pub workspace_root: Option<PathBuf>,
    /// Where a failed drop-guard teardown is reported
    pub guard_report: Option<GuardReport>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn isolated(mut self) -> Self {
        self.isolate = true;
        self
    }

    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn report_guard_to(mut self, report: GuardReport) -> Self {
        self.guard_report = Some(report);
        self
    }
}

/// One template's provisioning lifecycle, bound to a single test case.
pub struct Session {
    id: Uuid,
    name: String,
    driver: Arc<dyn LifecycleDriver>,
    handle: TemplateHandle,
    state: SessionState,
    teardown_owed: bool,
    applied: Option<ApplyResult>,
    // Dropped after `Drop::drop` has run the guard teardown; kept on disk
    // when teardown fails.
    workspace: Option<IsolatedWorkspace>,
    guard_report: Option<GuardReport>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("root", &self.handle.root())
            .field("state", &self.state)
            .field("teardown_owed", &self.teardown_owed)
            .finish()
    }
}

impl Session {
    /// Create an uninitialized session. Validates the template directory and,
    /// when requested, copies it into an isolated workspace.
    pub fn new(
        driver: Arc<dyn LifecycleDriver>,
        handle: TemplateHandle,
        options: SessionOptions,
    ) -> HarnessResult<Self> {
        handle.validate()?;
        let name = options.name.clone().unwrap_or_else(|| handle.name());

        let (handle, workspace) = if options.isolate {
            let (workspace, isolated) =
                IsolatedWorkspace::create(&handle, options.workspace_root.as_deref())?;
            (isolated, Some(workspace))
        } else {
            (handle, None)
        };

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            driver,
            handle,
            state: SessionState::Uninitialized,
            teardown_owed: false,
            applied: None,
            workspace,
            guard_report: options.guard_report,
        })
    }

    /// Create a session and apply it immediately.
    ///
    /// On a provisioning failure the conservative teardown runs before the
    /// error is returned; a teardown failure is logged and does not replace
    /// the provisioning error.
    pub async fn begin(
        driver: Arc<dyn LifecycleDriver>,
        handle: TemplateHandle,
        options: SessionOptions,
    ) -> HarnessResult<Self> {
        let mut session = Self::new(driver, handle, options)?;
        if let Err(provision) = session.apply().await {
            if let Err(teardown) = session.destroy().await {
                error!(
                    session = %session.name,
                    "Teardown after failed apply also failed: {}",
                    teardown
                );
            }
            return Err(provision);
        }
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle the engine runs against (the isolated copy, if any).
    pub fn handle(&self) -> &TemplateHandle {
        &self.handle
    }

    pub fn is_isolated(&self) -> bool {
        self.workspace.is_some()
    }

    /// Whether a destroy is still pending.
    pub fn teardown_owed(&self) -> bool {
        self.teardown_owed
    }

    /// Result of the successful apply.
    pub fn applied(&self) -> Option<&ApplyResult> {
        self.applied.as_ref()
    }

    /// Provision the template.
    pub async fn apply(&mut self) -> HarnessResult<&ApplyResult> {
        if self.state != SessionState::Uninitialized {
            return Err(HarnessError::InvalidState {
                expected: SessionState::Uninitialized,
                found: self.state,
            });
        }

        // A failed apply may still have created resources.
        self.teardown_owed = true;
        info!(session = %self.name, id = %self.id, "Applying {:?}", self.handle.root());

        match self.driver.apply(&self.handle).await {
            Ok(result) => {
                self.state = SessionState::Applied;
                Ok(self.applied.insert(result))
            }
            Err(e) => {
                self.state = SessionState::Failed;
                error!(session = %self.name, "Apply failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Resolve a named output of the applied template.
    pub fn output(&self, name: &str) -> HarnessResult<&OutputValue> {
        let applied = self.applied.as_ref().ok_or(HarnessError::InvalidState {
            expected: SessionState::Applied,
            found: self.state,
        })?;
        Ok(applied.output(name)?)
    }

    /// Tear down whatever the session provisioned.
    ///
    /// The driver is called at most once per session; later calls, and calls
    /// on a session that never applied, succeed without doing anything.
    pub async fn destroy(&mut self) -> HarnessResult<()> {
        if !self.teardown_owed {
            if self.state == SessionState::Uninitialized {
                self.state = SessionState::Destroyed;
            }
            return Ok(());
        }

        info!(session = %self.name, id = %self.id, "Destroying {:?}", self.handle.root());
        let result = self.driver.destroy(&self.handle).await;
        self.teardown_owed = false;
        self.applied = None;

        match result {
            Ok(()) => {
                self.state = SessionState::Destroyed;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Failed;
                let e = self.keep_workspace(e);
                error!(session = %self.name, "Teardown failed, resources may have leaked: {}", e);
                Err(e.into())
            }
        }
    }

    /// Leave an isolated workspace on disk after a failed teardown; its
    /// state file is the only record of what leaked.
    fn keep_workspace(&mut self, error: IacError) -> IacError {
        let Some(workspace) = self.workspace.take() else {
            return error;
        };
        let kept = workspace.keep();
        error!(
            session = %self.name,
            "Keeping isolated workspace {:?} for manual cleanup",
            kept
        );
        error.with_kept_state(&kept)
    }

    fn guard_failed(&mut self, error: IacError) {
        self.state = SessionState::Failed;
        let error = self.keep_workspace(error);
        error!(session = %self.name, "Guard teardown failed, resources may have leaked: {}", error);
        if let Some(report) = &self.guard_report {
            report.record(error.into());
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.teardown_owed {
            return;
        }

        warn!(
            session = %self.name,
            id = %self.id,
            "Session dropped with teardown pending, destroying synchronously"
        );

        let driver = self.driver.clone();
        let handle = self.handle.clone();
        let joined = std::thread::spawn(move || -> std::io::Result<IacResult<()>> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            Ok(runtime.block_on(driver.destroy(&handle)))
        })
        .join();

        self.teardown_owed = false;
        match joined {
            Ok(Ok(Ok(()))) => {
                self.state = SessionState::Destroyed;
                info!(session = %self.name, "Guard teardown complete");
            }
            Ok(Ok(Err(e))) => self.guard_failed(e),
            Ok(Err(e)) => self.guard_failed(IacError::Teardown {
                exit_code: -1,
                message: format!("could not start guard teardown runtime: {}", e),
                tail: String::new(),
            }),
            Err(_) => self.guard_failed(IacError::Teardown {
                exit_code: -1,
                message: "guard teardown thread panicked".to_string(),
                tail: String::new(),
            }),
        }
    }
}

/// What happened in a scoped session.
#[derive(Debug)]
pub struct SessionOutcome<T> {
    pub name: String,
    /// State after teardown
    pub state: SessionState,
    /// Value returned by the body, if it ran and succeeded
    pub value: Option<T>,
    /// Every failure in the order it happened; teardown failures come last
    pub failures: Vec<HarnessError>,
    pub duration: Duration,
}

impl<T> SessionOutcome<T> {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// First failure, or the body's value.
    pub fn into_result(self) -> HarnessResult<T> {
        let mut failures = self.failures.into_iter();
        match failures.next() {
            Some(first) => Err(first),
            None => self
                .value
                .ok_or_else(|| HarnessError::Suite("session produced no value".to_string())),
        }
    }
}

/// Run `body` against a freshly applied template and always tear it down.
///
/// The body receives the apply result. Whether it returns an error, panics,
/// or the apply itself fails, `destroy` is called exactly once before this
/// returns. Teardown failures are appended after any earlier failure.
pub async fn run_session<F, Fut, T>(
    driver: Arc<dyn LifecycleDriver>,
    handle: TemplateHandle,
    options: SessionOptions,
    body: F,
) -> SessionOutcome<T>
where
    F: FnOnce(ApplyResult) -> Fut,
    Fut: Future<Output = HarnessResult<T>>,
{
    let started = Instant::now();
    let fallback_name = options.name.clone().unwrap_or_else(|| handle.name());
    let mut failures = Vec::new();

    let mut session = match Session::new(driver, handle, options) {
        Ok(session) => session,
        Err(e) => {
            return SessionOutcome {
                name: fallback_name,
                state: SessionState::Failed,
                value: None,
                failures: vec![e],
                duration: started.elapsed(),
            }
        }
    };

    let mut value = None;
    match session.apply().await {
        Ok(applied) => {
            let applied = applied.clone();
            let guarded = AssertUnwindSafe(async move { body(applied).await }).catch_unwind();
            match guarded.await {
                Ok(Ok(v)) => value = Some(v),
                Ok(Err(e)) => failures.push(e),
                Err(panic) => failures.push(HarnessError::Panicked(panic_message(panic.as_ref()))),
            }
        }
        Err(e) => failures.push(e),
    }

    if let Err(e) = session.destroy().await {
        failures.push(e);
    }

    SessionOutcome {
        name: session.name().to_string(),
        state: session.state(),
        value,
        failures,
        duration: started.elapsed(),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");

        let boxed: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Applied.to_string(), "applied");
        assert_eq!(SessionState::Destroyed.to_string(), "destroyed");
    }

    #[test]
    fn test_session_options_builder() {
        let options = SessionOptions::new()
            .name("basic_instance")
            .isolated()
            .workspace_root("/tmp/infratest");

        assert_eq!(options.name.as_deref(), Some("basic_instance"));
        assert!(options.isolate);
        assert_eq!(options.workspace_root, Some(PathBuf::from("/tmp/infratest")));
    }
}
