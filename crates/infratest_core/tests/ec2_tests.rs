//! End-to-end tests against real AWS infrastructure.
//!
//! These create and destroy EC2 resources with the real terraform binary.
//! Run with:
//!
//! ```text
//! INFRATEST_E2E=1 INFRATEST_TEMPLATES=/path/to/templates \
//!     cargo test -p infratest_core --test ec2_tests -- --ignored
//! ```
//!
//! `INFRATEST_TEMPLATES` must contain the `single-instance` and `asg`
//! templates.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use infratest_core::{require_non_empty, run_session, HarnessConfig};
use infratest_iac::TemplateHandle;
use infratest_runner::ProcessRunner;

/// Explicit opt-in; these tests cost money.
fn templates_dir() -> Option<PathBuf> {
    if env::var("INFRATEST_E2E").is_err() {
        eprintln!("Skipping E2E test. Set INFRATEST_E2E=1 to run");
        return None;
    }
    match env::var("INFRATEST_TEMPLATES") {
        Ok(dir) => Some(PathBuf::from(dir)),
        Err(_) => panic!("INFRATEST_E2E is set but INFRATEST_TEMPLATES is not"),
    }
}

async fn provision_and_check(template: &str, output: &'static str) {
    let Some(templates) = templates_dir() else {
        return;
    };

    let mut config = HarnessConfig::default();
    config.apply_process_env().unwrap();
    let driver = config
        .build_driver(Arc::new(ProcessRunner::default()))
        .unwrap();

    let handle = TemplateHandle::new(templates.join(template))
        .var("environment", "test")
        .var("project", "terratest");

    let outcome = run_session(driver, handle, config.session_options(template), |applied| async move {
        require_non_empty(&applied, output)
    })
    .await;

    for failure in &outcome.failures {
        eprintln!("{}: {}", outcome.name, failure);
    }
    let value = outcome.into_result().unwrap();
    assert!(!value.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires AWS credentials and explicit opt-in
async fn test_basic_instance() {
    provision_and_check("single-instance", "instance_id").await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires AWS credentials and explicit opt-in
async fn test_asg() {
    provision_and_check("asg", "asg_name").await;
}
