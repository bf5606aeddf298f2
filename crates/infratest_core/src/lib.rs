//! # infratest_core
//!
//! Scoped test sessions and parallel scheduling for infratest.
//!
//! A [`Session`] ties one template's provisioned resources to a test case
//! and guarantees they are destroyed on every exit path. The [`Scheduler`]
//! runs many cases concurrently, each in its own session and (by default)
//! its own copy of the template directory.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use infratest_core::{require_non_empty, run_session, HarnessConfig, SessionOptions};
//! use infratest_iac::TemplateHandle;
//! use infratest_runner::ProcessRunner;
//!
//! # async fn example() -> Result<(), infratest_core::HarnessError> {
//! let config = HarnessConfig::default();
//! let driver = config.build_driver(Arc::new(ProcessRunner::default()))?;
//!
//! let handle = TemplateHandle::new("examples/single-instance")
//!     .var("environment", "test")
//!     .var("project", "terratest");
//!
//! let outcome = run_session(driver, handle, SessionOptions::new().isolated(), |applied| async move {
//!     require_non_empty(&applied, "instance_id")
//! })
//! .await;
//!
//! let instance_id = outcome.into_result()?;
//! println!("instance {instance_id} was created and destroyed");
//! # Ok(())
//! # }
//! ```

pub mod assertion;
pub mod config;
pub mod error;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod suite;

pub use assertion::{check_all, require_non_empty, Assertion, Expectation};
pub use config::{HarnessConfig, CONFIG_FILE_NAME};
pub use error::{FailureKind, HarnessError, HarnessResult};
pub use report::{CaseReport, FailureRecord, SuiteReport};
pub use scheduler::{CaseBody, Scheduler, TestCase};
pub use session::{
    run_session, GuardReport, Session, SessionOptions, SessionOutcome, SessionState,
};
pub use suite::{CaseSpec, Suite, SuiteFile};
