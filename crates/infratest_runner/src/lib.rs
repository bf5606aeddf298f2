//! # infratest_runner
//!
//! Subprocess execution layer for infratest.
//!
//! Every provisioning engine invocation goes through the [`CommandRunner`]
//! trait, so the lifecycle driver can run against real processes or a
//! scripted mock.
//!
//! # Features
//!
//! - **Process Runner**: `tokio::process` children with timeouts and `kill_on_drop`
//! - **Output Capture**: stdout/stderr collected separately, tail helper for diagnostics
//! - **Dry-Run Mode**: Log commands without execution
//! - **CI Integration**: Timestamped streamed output
//! - **Mock Runner**: Scripted responses per subcommand for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use infratest_runner::{CommandRunner, CommandSpec, ProcessRunner, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = ProcessRunner::default();
//!
//!     let spec = CommandSpec::new("terraform")
//!         .args(["init", "-input=false"])
//!         .workdir("examples/single-instance");
//!
//!     let result = runner.run(&spec, &RunConfig::default()).await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod process;
pub mod runner;

pub use config::{CommandSpec, RunConfig};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use process::{LogHandler, LogLine, LogStream, ProcessRunner, ProcessRunnerOptions};
pub use runner::{combine_output, tail_lines, CommandRunner, ExecutionResult};
