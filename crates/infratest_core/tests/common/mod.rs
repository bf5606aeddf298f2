//! Stateful stand-in for the terraform CLI.
//!
//! Tracks provisioned "resources" per working directory so tests can check
//! teardown and isolation without a cloud account. A template directory
//! controls the fake through marker files:
//!
//! - `outputs.json`: printed by `output -json` once applied
//! - `FAIL_APPLY`: apply creates a partial resource, then exits 1
//! - `FAIL_DESTROY`: destroy exits 1 and leaves the resource in place

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use infratest_iac::{LifecycleDriver, TerraformConfig, TerraformDriver};
use infratest_runner::{CommandRunner, CommandSpec, ExecutionResult, RunConfig, RunnerResult};

pub const SINGLE_INSTANCE_OUTPUTS: &str = r#"{
    "instance_id": {"sensitive": false, "type": "string", "value": "i-0123456789abcdef0"}
}"#;

pub const ASG_OUTPUTS: &str = r#"{
    "asg_name": {"sensitive": false, "type": "string", "value": "tf-asg-20240101"}
}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub subcommand: String,
    pub workdir: PathBuf,
}

#[derive(Default)]
struct State {
    /// Workdirs with live resources, and the `-var` args they were applied with
    live: HashMap<PathBuf, Vec<String>>,
    events: Vec<Event>,
}

#[derive(Clone, Default)]
pub struct FakeTerraform {
    state: Arc<Mutex<State>>,
    apply_delay: Duration,
    active_applies: Arc<AtomicUsize>,
    max_active_applies: Arc<AtomicUsize>,
}

impl FakeTerraform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every apply take `delay`.
    pub fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = delay;
        self
    }

    pub fn driver(&self) -> Arc<dyn LifecycleDriver> {
        let config = TerraformConfig::default().no_retries();
        Arc::new(TerraformDriver::new(Arc::new(self.clone()), Arc::new(config)).unwrap())
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn count(&self, subcommand: &str) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| e.subcommand == subcommand)
            .count()
    }

    pub fn workdirs(&self, subcommand: &str) -> Vec<PathBuf> {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| e.subcommand == subcommand)
            .map(|e| e.workdir.clone())
            .collect()
    }

    /// Workdirs that still hold resources.
    pub fn live(&self) -> Vec<PathBuf> {
        self.state.lock().live.keys().cloned().collect()
    }

    pub fn is_live(&self, workdir: &Path) -> bool {
        self.state.lock().live.contains_key(workdir)
    }

    pub fn max_concurrent_applies(&self) -> usize {
        self.max_active_applies.load(Ordering::SeqCst)
    }

    fn record(&self, subcommand: &str, workdir: &Path) {
        self.state.lock().events.push(Event {
            subcommand: subcommand.to_string(),
            workdir: workdir.to_path_buf(),
        });
    }

    async fn apply(&self, spec: &CommandSpec, workdir: &Path) -> (i64, String, String) {
        let active = self.active_applies.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_applies.fetch_max(active, Ordering::SeqCst);
        if !self.apply_delay.is_zero() {
            tokio::time::sleep(self.apply_delay).await;
        }
        self.active_applies.fetch_sub(1, Ordering::SeqCst);

        let vars: Vec<String> = spec
            .args
            .windows(2)
            .filter(|w| w[0] == "-var")
            .map(|w| w[1].clone())
            .collect();
        self.state.lock().live.insert(workdir.to_path_buf(), vars);
        let _ = fs::write(workdir.join("terraform.tfstate"), "{\"version\": 4}");

        if workdir.join("FAIL_APPLY").exists() {
            return (
                1,
                String::new(),
                "Error: creating EC2 Instance: InsufficientInstanceCapacity".to_string(),
            );
        }
        (0, "Apply complete! Resources: 1 added, 0 changed, 0 destroyed.".to_string(), String::new())
    }

    fn output(&self, workdir: &Path) -> (i64, String, String) {
        if !self.is_live(workdir) {
            return (0, "{}".to_string(), String::new());
        }
        let json = fs::read_to_string(workdir.join("outputs.json")).unwrap_or_else(|_| "{}".to_string());
        (0, json, String::new())
    }

    fn destroy(&self, workdir: &Path) -> (i64, String, String) {
        if workdir.join("FAIL_DESTROY").exists() {
            return (
                1,
                String::new(),
                "Error: deleting Auto Scaling Group: ResourceInUse".to_string(),
            );
        }
        self.state.lock().live.remove(workdir);
        let _ = fs::remove_file(workdir.join("terraform.tfstate"));
        (0, "Destroy complete! Resources: 1 destroyed.".to_string(), String::new())
    }
}

#[async_trait]
impl CommandRunner for FakeTerraform {
    async fn is_available(&self, _program: &str) -> RunnerResult<bool> {
        Ok(true)
    }

    async fn run(&self, spec: &CommandSpec, _run_config: &RunConfig) -> RunnerResult<ExecutionResult> {
        let started_at = Utc::now();
        let subcommand = spec.subcommand().unwrap_or_default().to_string();
        let workdir = spec.workdir.clone().unwrap_or_default();
        self.record(&subcommand, &workdir);

        let (exit_code, stdout, stderr) = match subcommand.as_str() {
            "apply" => self.apply(spec, &workdir).await,
            "output" => self.output(&workdir),
            "destroy" => self.destroy(&workdir),
            _ => (0, String::new(), String::new()),
        };

        Ok(ExecutionResult {
            command: spec.display(),
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
            duration_ms: 0,
        })
    }
}

/// Create `parent/name` with a `main.tf` and the given outputs.
pub fn template(parent: &Path, name: &str, outputs: &str) -> PathBuf {
    let root = parent.join(name);
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("main.tf"), "# fake template\n").unwrap();
    fs::write(root.join("outputs.json"), outputs).unwrap();
    root
}

/// Add a marker file to a template.
pub fn mark(root: &Path, marker: &str) {
    fs::write(root.join(marker), "").unwrap();
}
