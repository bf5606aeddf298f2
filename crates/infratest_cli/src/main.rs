//! infratest CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Test failure (assertion, missing output, panic)
//! - 4: Provisioning error
//! - 5: Teardown error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use infratest_core::{FailureKind, HarnessError};
use infratest_iac::IacError;
use infratest_runner::RunnerError;

mod commands;

use commands::{AppContext, Cli, Commands, LogFormat};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const TEST_FAILURE: u8 = 3;
    pub const PROVISION_ERROR: u8 = 4;
    pub const TEARDOWN_ERROR: u8 = 5;

    /// Exit code for the most severe failure of a run.
    pub fn for_kind(kind: FailureKind) -> u8 {
        match kind {
            FailureKind::Teardown => Self::TEARDOWN_ERROR,
            FailureKind::Provision => Self::PROVISION_ERROR,
            FailureKind::Assertion | FailureKind::MissingOutput | FailureKind::Panic => {
                Self::TEST_FAILURE
            }
            FailureKind::Other | FailureKind::Cancelled => Self::GENERAL_ERROR,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let result = match AppContext::load(cli.config.as_deref()) {
        Ok(ctx) => match cli.command {
            Commands::Run(args) => commands::run::execute(args, ctx).await,
            Commands::Apply(args) => commands::apply::execute(args, ctx).await,
            Commands::Output(args) => commands::output::execute(args, ctx).await,
            Commands::Destroy(args) => commands::destroy::execute(args, ctx).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let default_filter = if verbose {
        "infratest=debug,warn"
    } else {
        "infratest=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let json = format == LogFormat::Json;
    let log_result = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr)))
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(harness) = cause.downcast_ref::<HarnessError>() {
            return match harness {
                HarnessError::Config(_)
                | HarnessError::Suite(_)
                | HarnessError::DuplicateCase(_)
                | HarnessError::SharedWorkspace(_)
                | HarnessError::Yaml(_)
                | HarnessError::Toml(_)
                | HarnessError::Iac(IacError::TemplateNotFound(_)) => ExitCodes::INVALID_ARGS,
                other => ExitCodes::for_kind(other.kind()),
            };
        }
        if let Some(iac) = cause.downcast_ref::<IacError>() {
            return match iac {
                IacError::TemplateNotFound(_) => ExitCodes::INVALID_ARGS,
                other => ExitCodes::for_kind(FailureKind::of_iac(other)),
            };
        }
        if let Some(RunnerError::ProgramNotAvailable(_)) = cause.downcast_ref::<RunnerError>() {
            return ExitCodes::INVALID_ARGS;
        }
    }
    ExitCodes::GENERAL_ERROR
}
