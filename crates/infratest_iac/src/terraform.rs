//! Terraform lifecycle driver.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use infratest_runner::{tail_lines, CommandRunner, CommandSpec, ExecutionResult, RunConfig};

use crate::config::TerraformConfig;
use crate::driver::{LifecycleDriver, LifecycleStep};
use crate::error::{IacError, IacResult};
use crate::output::{ApplyResult, Outputs};
use crate::template::TemplateHandle;

/// Why a step did not succeed.
#[derive(Debug)]
struct StepFailure {
    exit_code: i64,
    message: String,
    tail: String,
}

impl StepFailure {
    fn into_provision(self, step: LifecycleStep) -> IacError {
        IacError::Provision {
            step,
            exit_code: self.exit_code,
            message: self.message,
            tail: self.tail,
        }
    }

    fn into_teardown(self) -> IacError {
        IacError::Teardown {
            exit_code: self.exit_code,
            message: self.message,
            tail: self.tail,
        }
    }
}

/// Drives the `terraform` CLI through a [`CommandRunner`].
pub struct TerraformDriver {
    runner: Arc<dyn CommandRunner>,
    config: Arc<TerraformConfig>,
    retryable: Vec<Regex>,
}

impl TerraformDriver {
    /// Create a driver. Fails if a retryable error pattern does not compile.
    pub fn new(runner: Arc<dyn CommandRunner>, config: Arc<TerraformConfig>) -> IacResult<Self> {
        let retryable = config.retry_patterns()?;
        Ok(Self {
            runner,
            config,
            retryable,
        })
    }

    pub fn config(&self) -> &TerraformConfig {
        &self.config
    }

    /// Check the engine binary can be executed.
    pub async fn is_available(&self) -> bool {
        self.runner
            .is_available(&self.config.binary)
            .await
            .unwrap_or(false)
    }

    pub fn init_args(&self, handle: &TemplateHandle) -> Vec<String> {
        let mut args = vec![
            "init".to_string(),
            "-input=false".to_string(),
            "-upgrade=false".to_string(),
        ];
        for (key, value) in &handle.backend_config {
            args.push(format!("-backend-config={}={}", key, value));
        }
        self.push_no_color(&mut args);
        args
    }

    pub fn apply_args(&self, handle: &TemplateHandle) -> Vec<String> {
        let mut args = vec![
            "apply".to_string(),
            "-input=false".to_string(),
            "-auto-approve".to_string(),
        ];
        self.push_lock(&mut args);
        args.extend(handle.var_args());
        self.push_no_color(&mut args);
        args
    }

    pub fn output_args(&self) -> Vec<String> {
        let mut args = vec!["output".to_string(), "-json".to_string()];
        self.push_no_color(&mut args);
        args
    }

    pub fn destroy_args(&self, handle: &TemplateHandle) -> Vec<String> {
        let mut args = vec![
            "destroy".to_string(),
            "-input=false".to_string(),
            "-auto-approve".to_string(),
        ];
        self.push_lock(&mut args);
        args.extend(handle.var_args());
        self.push_no_color(&mut args);
        args
    }

    fn push_no_color(&self, args: &mut Vec<String>) {
        if self.config.no_color {
            args.push("-no-color".to_string());
        }
    }

    fn push_lock(&self, args: &mut Vec<String>) {
        if self.config.lock {
            args.push("-lock=true".to_string());
        }
    }

    /// Build the invocation: automation env, then config env, then handle env.
    fn command(&self, handle: &TemplateHandle, args: Vec<String>) -> CommandSpec {
        CommandSpec::new(&self.config.binary)
            .args(args)
            .workdir(handle.root())
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .envs(self.config.env.clone())
            .envs(handle.env.clone())
    }

    fn is_retryable(&self, output: &str) -> Option<&Regex> {
        self.retryable.iter().find(|re| re.is_match(output))
    }

    /// Run one step, retrying failures whose output matches a retryable pattern.
    async fn run_step(
        &self,
        handle: &TemplateHandle,
        step: LifecycleStep,
        args: Vec<String>,
        timeout_secs: u64,
    ) -> Result<ExecutionResult, StepFailure> {
        let spec = self.command(handle, args);
        let run_config = RunConfig::default()
            .timeout(timeout_secs)
            .stream_logs(self.config.stream_logs);

        let mut attempt: u32 = 0;
        loop {
            debug!(step = %step, attempt, "Running {}", spec.display());

            let result = match self.runner.run(&spec, &run_config).await {
                Ok(result) => result,
                Err(e) => {
                    return Err(StepFailure {
                        exit_code: -1,
                        message: e.to_string(),
                        tail: e
                            .partial_output()
                            .map(|output| tail_lines(&output, self.config.tail_lines))
                            .unwrap_or_default(),
                    })
                }
            };

            if result.success() {
                return Ok(result);
            }

            let output = result.combined_output();
            if attempt < self.config.max_retries {
                if let Some(pattern) = self.is_retryable(&output) {
                    attempt += 1;
                    warn!(
                        step = %step,
                        attempt,
                        max_retries = self.config.max_retries,
                        "Retryable error matched '{}', retrying in {}s",
                        pattern.as_str(),
                        self.config.time_between_retries_secs
                    );
                    tokio::time::sleep(self.config.time_between_retries()).await;
                    continue;
                }
            }

            return Err(StepFailure {
                exit_code: result.exit_code,
                message: format!("exited with code {}", result.exit_code),
                tail: result.tail(self.config.tail_lines),
            });
        }
    }

    async fn read_outputs(&self, handle: &TemplateHandle) -> IacResult<Outputs> {
        let result = self
            .run_step(
                handle,
                LifecycleStep::Output,
                self.output_args(),
                self.config.apply_timeout_secs,
            )
            .await
            .map_err(|f| f.into_provision(LifecycleStep::Output))?;

        Outputs::parse(&result.stdout)
    }
}

#[async_trait]
impl LifecycleDriver for TerraformDriver {
    async fn apply(&self, handle: &TemplateHandle) -> IacResult<ApplyResult> {
        handle.validate()?;
        let timeout = self.config.apply_timeout_secs;

        info!(template = %handle.name(), "Running terraform init in {:?}", handle.root());
        self.run_step(handle, LifecycleStep::Init, self.init_args(handle), timeout)
            .await
            .map_err(|f| f.into_provision(LifecycleStep::Init))?;

        info!(template = %handle.name(), "Running terraform apply in {:?}", handle.root());
        self.run_step(handle, LifecycleStep::Apply, self.apply_args(handle), timeout)
            .await
            .map_err(|f| f.into_provision(LifecycleStep::Apply))?;

        let outputs = self.read_outputs(handle).await?;
        info!(
            template = %handle.name(),
            outputs = outputs.len(),
            "Apply complete"
        );

        Ok(ApplyResult::new(handle.root(), outputs))
    }

    async fn destroy(&self, handle: &TemplateHandle) -> IacResult<()> {
        if !handle.root().is_dir() {
            warn!(
                template = %handle.name(),
                "Template directory {:?} is gone, nothing to destroy",
                handle.root()
            );
            return Ok(());
        }

        info!(template = %handle.name(), "Running terraform destroy in {:?}", handle.root());
        self.run_step(
            handle,
            LifecycleStep::Destroy,
            self.destroy_args(handle),
            self.config.destroy_timeout_secs,
        )
        .await
        .map_err(StepFailure::into_teardown)?;

        info!(template = %handle.name(), "Destroy complete");
        Ok(())
    }

    async fn outputs(&self, handle: &TemplateHandle) -> IacResult<Outputs> {
        handle.validate()?;
        self.read_outputs(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infratest_runner::MockRunner;

    fn driver(config: TerraformConfig) -> TerraformDriver {
        TerraformDriver::new(Arc::new(MockRunner::new()), Arc::new(config)).unwrap()
    }

    #[test]
    fn test_apply_args() {
        let driver = driver(TerraformConfig::default());
        let handle = TemplateHandle::new("tpl")
            .var("environment", "test")
            .var("project", "terratest");

        assert_eq!(
            driver.apply_args(&handle),
            vec![
                "apply",
                "-input=false",
                "-auto-approve",
                "-lock=true",
                "-var",
                "environment=test",
                "-var",
                "project=terratest",
                "-no-color",
            ]
        );
    }

    #[test]
    fn test_init_args_with_backend_config() {
        let mut config = TerraformConfig::default();
        config.no_color = false;
        let driver = driver(config);
        let handle = TemplateHandle::new("tpl").backend_config("bucket", "tf-state");

        assert_eq!(
            driver.init_args(&handle),
            vec!["init", "-input=false", "-upgrade=false", "-backend-config=bucket=tf-state"]
        );
    }

    #[test]
    fn test_destroy_and_output_args() {
        let mut config = TerraformConfig::default();
        config.lock = false;
        let driver = driver(config);
        let handle = TemplateHandle::new("tpl").var_file("ci.tfvars");

        assert_eq!(
            driver.destroy_args(&handle),
            vec!["destroy", "-input=false", "-auto-approve", "-var-file", "ci.tfvars", "-no-color"]
        );
        assert_eq!(driver.output_args(), vec!["output", "-json", "-no-color"]);
    }

    #[test]
    fn test_env_precedence() {
        let driver = driver(TerraformConfig::default().env("AWS_REGION", "us-east-1"));
        let handle = TemplateHandle::new("tpl").env("AWS_REGION", "eu-west-1");

        let spec = driver.command(&handle, vec!["init".to_string()]);
        assert_eq!(spec.env.get("AWS_REGION").map(String::as_str), Some("eu-west-1"));
        assert_eq!(spec.env.get("TF_IN_AUTOMATION").map(String::as_str), Some("1"));
        assert_eq!(spec.workdir.as_deref(), Some(std::path::Path::new("tpl")));
    }
}
