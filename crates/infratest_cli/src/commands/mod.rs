//! CLI command definitions.
//!
//! `run` executes a suite of test cases; `apply`, `output` and `destroy`
//! drive a single template by hand.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use infratest_core::HarnessConfig;
use infratest_iac::{LifecycleDriver, TemplateHandle, TerraformDriver};
use infratest_runner::{CommandRunner, ProcessRunner, ProcessRunnerOptions, RunnerError};

pub mod apply;
pub mod destroy;
pub mod output;
pub mod run;

/// infratest - infrastructure lifecycle test harness
#[derive(Parser)]
#[command(name = "infratest")]
#[command(version, about = "infratest - provision, assert, destroy")]
#[command(long_about = r#"
infratest provisions ephemeral infrastructure from template directories,
checks the template's outputs, and always tears everything down again.

COMMANDS:
  run      → Run a suite of test cases in parallel
  apply    → Provision a template and print its outputs
  output   → Print the outputs of an applied template
  destroy  → Tear down a template

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Test failure (assertion, missing output)
  4 - Provisioning error
  5 - Teardown error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Configuration file (defaults to ./infratest.toml if present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a suite of test cases
    Run(run::RunArgs),

    /// Provision a template and print its outputs (no teardown)
    Apply(apply::ApplyArgs),

    /// Print the outputs of an applied template
    Output(output::OutputArgs),

    /// Tear down a template
    Destroy(destroy::DestroyArgs),
}

/// Template selection shared by the single-template commands.
#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Template directory
    #[arg(short, long, value_name = "DIR")]
    pub dir: PathBuf,

    /// Input variable, repeatable
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Variable file relative to the template directory, repeatable
    #[arg(long = "var-file", value_name = "FILE")]
    pub var_files: Vec<PathBuf>,
}

impl TemplateArgs {
    pub fn handle(&self) -> TemplateHandle {
        let mut handle = TemplateHandle::new(&self.dir).vars(self.vars.iter().cloned());
        for file in &self.var_files {
            handle = handle.var_file(file);
        }
        handle
    }
}

/// Parse a `KEY=VALUE` pair.
pub fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Configuration and runner resolved once at startup.
pub struct AppContext {
    pub config: HarnessConfig,
    pub runner: Arc<dyn CommandRunner>,
}

impl AppContext {
    /// Defaults, then the config file, then `INFRATEST_*` environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = HarnessConfig::load(path).context("Failed to load configuration")?;
        config
            .apply_process_env()
            .context("Invalid environment override")?;

        Ok(Self {
            config,
            runner: Arc::new(ProcessRunner::default()),
        })
    }

    /// Switch to a runner that logs commands instead of executing them.
    pub fn dry_run(mut self) -> Self {
        self.runner = Arc::new(ProcessRunner::new(ProcessRunnerOptions::new().dry_run()));
        self
    }

    pub fn terraform(&self) -> Result<TerraformDriver> {
        TerraformDriver::new(self.runner.clone(), Arc::new(self.config.terraform.clone()))
            .context("Failed to create terraform driver")
    }

    pub fn driver(&self) -> Result<Arc<dyn LifecycleDriver>> {
        Ok(self.config.build_driver(self.runner.clone())?)
    }

    /// Fail early when the engine binary cannot be run.
    pub async fn ensure_engine(&self) -> Result<()> {
        if self.terraform()?.is_available().await {
            return Ok(());
        }
        Err(RunnerError::ProgramNotAvailable(self.config.terraform.binary.clone())).context(
            "Set terraform.binary in the config file or INFRATEST_TERRAFORM_BIN",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infratest_iac::VarValue;

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("environment=test").unwrap(),
            ("environment".to_string(), "test".to_string())
        );
        assert_eq!(
            parse_var("tags={\"a\"=\"b=c\"}").unwrap(),
            ("tags".to_string(), "{\"a\"=\"b=c\"}".to_string())
        );
        assert_eq!(parse_var("empty=").unwrap().1, "");
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "infratest",
            "--log-format",
            "json",
            "run",
            "--suite",
            "suites/ec2.yaml",
            "--case",
            "basic_instance",
            "--case",
            "autoscaling_group",
            "--max-parallel",
            "2",
            "--no-isolate",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.suite, PathBuf::from("suites/ec2.yaml"));
                assert_eq!(args.cases, vec!["basic_instance", "autoscaling_group"]);
                assert_eq!(args.max_parallel, Some(2));
                assert!(args.no_isolate);
                assert!(!args.dry_run);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_parses_apply_vars() {
        let cli = Cli::try_parse_from([
            "infratest",
            "apply",
            "--dir",
            "examples/asg",
            "--var",
            "environment=test",
            "--var",
            "project=terratest",
            "--var-file",
            "ci.tfvars",
        ])
        .unwrap();

        let Commands::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        let handle = args.template.handle();
        assert_eq!(handle.root(), Path::new("examples/asg"));
        assert_eq!(handle.vars.get("project"), Some(&VarValue::from("terratest")));
        assert_eq!(handle.var_files, vec![PathBuf::from("ci.tfvars")]);
    }

    #[test]
    fn test_cli_rejects_bad_var() {
        let result = Cli::try_parse_from(["infratest", "destroy", "--dir", "x", "--var", "oops"]);
        assert!(result.is_err());

        let zero = Cli::try_parse_from(["infratest", "run", "--suite", "s.yaml", "--max-parallel", "0"]);
        assert!(zero.is_err());
    }
}
