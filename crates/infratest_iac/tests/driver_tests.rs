//! Integration tests for the Terraform lifecycle driver.
//!
//! The engine is replaced by a scripted mock runner, so these tests check
//! the command sequence and error mapping rather than real infrastructure.

use std::sync::Arc;

use infratest_iac::{
    IacError, LifecycleDriver, LifecycleStep, OutputValue, TemplateHandle, TerraformConfig,
    TerraformDriver,
};
use infratest_runner::{MockResponse, MockRunner, ProcessRunner};
use tempfile::TempDir;

const OUTPUTS: &str = r#"{
    "instance_id": {"sensitive": false, "type": "string", "value": "i-0123456789abcdef0"},
    "private_ips": {"sensitive": false, "type": ["list", "string"], "value": ["10.0.1.10"]}
}"#;

fn template_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.tf"), "").unwrap();
    dir
}

fn driver_with(runner: &MockRunner, config: TerraformConfig) -> TerraformDriver {
    TerraformDriver::new(Arc::new(runner.clone()), Arc::new(config)).unwrap()
}

fn handle(dir: &TempDir) -> TemplateHandle {
    TemplateHandle::new(dir.path())
        .var("environment", "test")
        .var("project", "terratest")
}

#[tokio::test]
async fn test_apply_runs_init_apply_output_in_template_dir() {
    let dir = template_dir();
    let runner = MockRunner::new().on("output", MockResponse::success(OUTPUTS));
    let driver = driver_with(&runner, TerraformConfig::default());

    let applied = driver.apply(&handle(&dir)).await.unwrap();

    assert_eq!(runner.subcommands(), vec!["init", "apply", "output"]);
    assert_eq!(
        applied.output("instance_id").unwrap(),
        &OutputValue::String("i-0123456789abcdef0".to_string())
    );
    assert_eq!(applied.output_string("private_ips").unwrap(), "10.0.1.10");
    assert_eq!(applied.workdir, dir.path());

    for call in runner.get_calls() {
        assert_eq!(call.program, "terraform");
        assert_eq!(call.workdir.as_deref(), Some(dir.path()));
    }
    let apply = &runner.get_subcommand_calls("apply")[0];
    assert!(apply.has_arg("environment=test"));
    assert!(apply.has_arg("project=terratest"));
    assert!(apply.has_arg("-auto-approve"));
}

#[tokio::test]
async fn test_apply_failure_is_provision_error_with_tail() {
    let dir = template_dir();
    let runner = MockRunner::new().on(
        "apply",
        MockResponse::failure(1, "Planning...\nError: creating EC2 Instance: UnauthorizedOperation"),
    );
    let driver = driver_with(&runner, TerraformConfig::default().tail_lines(1));

    let err = driver.apply(&handle(&dir)).await.unwrap_err();

    match &err {
        IacError::Provision {
            step,
            exit_code,
            tail,
            ..
        } => {
            assert_eq!(*step, LifecycleStep::Apply);
            assert_eq!(*exit_code, 1);
            assert_eq!(tail, "Error: creating EC2 Instance: UnauthorizedOperation");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!runner.was_called("output"));
}

#[tokio::test]
async fn test_init_failure_stops_before_apply() {
    let dir = template_dir();
    let runner = MockRunner::new().on("init", MockResponse::failure(1, "Error: Failed to get existing workspaces"));
    let driver = driver_with(&runner, TerraformConfig::default());

    let err = driver.apply(&handle(&dir)).await.unwrap_err();

    assert!(matches!(err, IacError::Provision { step: LifecycleStep::Init, .. }));
    assert_eq!(runner.subcommands(), vec!["init"]);
}

#[tokio::test]
async fn test_runner_error_is_provision_error() {
    let dir = template_dir();
    let runner = MockRunner::new().simulate_failure("No such file or directory");
    let driver = driver_with(&runner, TerraformConfig::default());

    let err = driver.apply(&handle(&dir)).await.unwrap_err();
    assert!(matches!(err, IacError::Provision { step: LifecycleStep::Init, exit_code: -1, .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_apply_timeout_keeps_output_tail() {
    use std::os::unix::fs::PermissionsExt;

    let dir = template_dir();
    let bin = tempfile::tempdir().unwrap();
    let engine = bin.path().join("terraform");
    std::fs::write(
        &engine,
        "#!/bin/sh\ncase \"$1\" in\n  apply) echo 'aws_instance.web: Still creating... [10s elapsed]'; exec sleep 5 ;;\n  *) exit 0 ;;\nesac\n",
    )
    .unwrap();
    std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = TerraformConfig {
        apply_timeout_secs: 1,
        ..TerraformConfig::default().binary(engine.display().to_string()).no_retries()
    };
    let driver = TerraformDriver::new(Arc::new(ProcessRunner::default()), Arc::new(config)).unwrap();

    let err = driver.apply(&handle(&dir)).await.unwrap_err();
    match err {
        IacError::Provision { step, exit_code, message, tail } => {
            assert_eq!(step, LifecycleStep::Apply);
            assert_eq!(exit_code, -1);
            assert!(message.contains("timeout"), "{message}");
            assert!(tail.contains("Still creating..."), "{tail:?}");
        }
        other => panic!("expected provision error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retryable_errors_are_retried() {
    let dir = template_dir();
    let runner = MockRunner::new()
        .on("init", MockResponse::failure(1, "Error: Failed to query available provider packages"))
        .on("init", MockResponse::success("Terraform has been successfully initialized!"));
    let driver = driver_with(&runner, TerraformConfig::default().retries(3, 0));

    driver.apply(&handle(&dir)).await.unwrap();

    assert_eq!(runner.subcommands(), vec!["init", "init", "apply", "output"]);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let dir = template_dir();
    let runner = MockRunner::new().on("apply", MockResponse::failure(1, "read: connection reset by peer"));
    let driver = driver_with(&runner, TerraformConfig::default().retries(2, 0));

    let err = driver.apply(&handle(&dir)).await.unwrap_err();

    assert!(matches!(err, IacError::Provision { step: LifecycleStep::Apply, .. }));
    assert_eq!(runner.get_subcommand_calls("apply").len(), 3);
}

#[tokio::test]
async fn test_non_retryable_errors_fail_immediately() {
    let dir = template_dir();
    let runner = MockRunner::new().on("apply", MockResponse::failure(1, "Error: Invalid reference"));
    let driver = driver_with(&runner, TerraformConfig::default().retries(3, 0));

    driver.apply(&handle(&dir)).await.unwrap_err();
    assert_eq!(runner.get_subcommand_calls("apply").len(), 1);
}

#[tokio::test]
async fn test_destroy_passes_vars() {
    let dir = template_dir();
    let runner = MockRunner::new();
    let driver = driver_with(&runner, TerraformConfig::default());

    driver.destroy(&handle(&dir)).await.unwrap();

    let calls = runner.get_subcommand_calls("destroy");
    assert_eq!(calls.len(), 1);
    assert!(calls[0].has_arg("-auto-approve"));
    assert!(calls[0].has_arg("environment=test"));
}

#[tokio::test]
async fn test_destroy_failure_is_teardown_error() {
    let dir = template_dir();
    let runner = MockRunner::new().on("destroy", MockResponse::failure(1, "Error: deleting Auto Scaling Group"));
    let driver = driver_with(&runner, TerraformConfig::default().no_retries());

    let err = driver.destroy(&handle(&dir)).await.unwrap_err();

    assert!(matches!(err, IacError::Teardown { exit_code: 1, .. }));
    assert_eq!(err.tail(), Some("Error: deleting Auto Scaling Group"));
}

#[tokio::test]
async fn test_destroy_without_template_dir_is_noop() {
    let runner = MockRunner::new();
    let driver = driver_with(&runner, TerraformConfig::default());

    driver
        .destroy(&TemplateHandle::new("/definitely/not/a/template"))
        .await
        .unwrap();
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn test_apply_missing_template_dir() {
    let runner = MockRunner::new();
    let driver = driver_with(&runner, TerraformConfig::default());

    let err = driver
        .apply(&TemplateHandle::new("/definitely/not/a/template"))
        .await
        .unwrap_err();
    assert!(matches!(err, IacError::TemplateNotFound(_)));
    assert_eq!(runner.call_count(), 0);
}

#[tokio::test]
async fn test_outputs_requery() {
    let dir = template_dir();
    let runner = MockRunner::new().on("output", MockResponse::success(OUTPUTS));
    let driver = driver_with(&runner, TerraformConfig::default());

    let outputs = driver.outputs(&handle(&dir)).await.unwrap();

    assert_eq!(outputs.names(), vec!["instance_id", "private_ips"]);
    assert_eq!(runner.subcommands(), vec!["output"]);
}
