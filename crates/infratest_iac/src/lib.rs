//! # infratest_iac
//!
//! Infrastructure-as-code lifecycle for infratest.
//!
//! This crate turns a template directory plus input variables into
//! provisioned infrastructure by driving the Terraform CLI, reads the
//! template's outputs back, and tears everything down again.
//!
//! ## Features
//!
//! - Template handles with typed input variables (`-var`, `-var-file`, backend config)
//! - `init` / `apply` / `output -json` / `destroy` through a pluggable command runner
//! - Retries for well-known transient engine errors
//! - Typed outputs (string, list, map) with explicit missing-output errors
//! - Per-session template copies so concurrent runs never share local state
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use infratest_iac::{LifecycleDriver, TemplateHandle, TerraformConfig, TerraformDriver};
//! use infratest_runner::ProcessRunner;
//!
//! # async fn example() -> Result<(), infratest_iac::IacError> {
//! let driver = TerraformDriver::new(
//!     Arc::new(ProcessRunner::default()),
//!     Arc::new(TerraformConfig::default()),
//! )?;
//!
//! let handle = TemplateHandle::new("examples/single-instance")
//!     .var("environment", "test")
//!     .var("project", "terratest");
//!
//! let applied = driver.apply(&handle).await?;
//! println!("instance: {}", applied.output("instance_id")?);
//! driver.destroy(&handle).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod output;
pub mod template;
pub mod terraform;
pub mod workspace;

pub use config::{TerraformConfig, DEFAULT_RETRYABLE_ERRORS};
pub use driver::{LifecycleDriver, LifecycleStep};
pub use error::{IacError, IacResult};
pub use output::{ApplyResult, OutputEntry, OutputValue, Outputs};
pub use template::{TemplateHandle, VarValue};
pub use terraform::TerraformDriver;
pub use workspace::IsolatedWorkspace;
