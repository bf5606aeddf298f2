//! Harness configuration.
//!
//! Resolved once at startup: defaults, then a TOML file, then environment
//! overrides. The CLI applies its own flags last.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use infratest_iac::{LifecycleDriver, TerraformConfig, TerraformDriver};
use infratest_runner::CommandRunner;

use crate::error::{HarnessError, HarnessResult};
use crate::session::SessionOptions;

/// Config file picked up from the working directory when none is given.
pub const CONFIG_FILE_NAME: &str = "infratest.toml";

pub const ENV_TERRAFORM_BIN: &str = "INFRATEST_TERRAFORM_BIN";
pub const ENV_MAX_PARALLEL: &str = "INFRATEST_MAX_PARALLEL";
pub const ENV_NO_ISOLATE: &str = "INFRATEST_NO_ISOLATE";

/// Settings for a harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Maximum number of cases provisioning at once
    pub max_parallel: usize,
    /// Copy each template into a private workspace per session
    pub isolate_workspaces: bool,
    /// Parent directory for isolated workspaces (system temp dir when unset)
    pub workspace_root: Option<PathBuf>,
    pub terraform: TerraformConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_parallelism(),
            isolate_workspaces: true,
            workspace_root: None,
            terraform: TerraformConfig::default(),
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl HarnessConfig {
    pub fn from_toml_str(content: &str) -> HarnessResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from `infratest.toml` in the current directory
    /// if it exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> HarnessResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let local = PathBuf::from(CONFIG_FILE_NAME);
                if !local.is_file() {
                    debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                    return Ok(Self::default());
                }
                local
            }
        };

        debug!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(&path).map_err(|e| {
            HarnessError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `INFRATEST_*` overrides from the given variables.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> HarnessResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                ENV_TERRAFORM_BIN if !value.is_empty() => {
                    self.terraform.binary = value.to_string();
                }
                ENV_MAX_PARALLEL => {
                    self.max_parallel = value.parse().map_err(|_| {
                        HarnessError::Config(format!(
                            "{} must be a positive integer, got '{}'",
                            ENV_MAX_PARALLEL, value
                        ))
                    })?;
                }
                ENV_NO_ISOLATE => {
                    let value = value.to_lowercase();
                    if !matches!(value.as_str(), "" | "0" | "false" | "no") {
                        self.isolate_workspaces = false;
                    }
                }
                _ => {}
            }
        }
        self.validate()
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> HarnessResult<()> {
        self.apply_env(std::env::vars())
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.max_parallel == 0 {
            return Err(HarnessError::Config(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        if self.terraform.binary.trim().is_empty() {
            return Err(HarnessError::Config(
                "terraform.binary must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Session options for one case under this configuration.
    pub fn session_options(&self, name: impl Into<String>) -> SessionOptions {
        let mut options = SessionOptions::new().name(name);
        if self.isolate_workspaces {
            options = options.isolated();
        }
        if let Some(root) = &self.workspace_root {
            options = options.workspace_root(root);
        }
        options
    }

    /// Build the Terraform driver this configuration describes.
    pub fn build_driver(
        &self,
        runner: Arc<dyn CommandRunner>,
    ) -> HarnessResult<Arc<dyn LifecycleDriver>> {
        let driver = TerraformDriver::new(runner, Arc::new(self.terraform.clone()))?;
        Ok(Arc::new(driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert!(config.max_parallel >= 1);
        assert!(config.isolate_workspaces);
        assert_eq!(config.terraform.binary, "terraform");
    }

    #[test]
    fn test_from_toml() {
        let config = HarnessConfig::from_toml_str(
            r#"
max_parallel = 2
isolate_workspaces = false

[terraform]
binary = "tofu"
max_retries = 1

[terraform.env]
AWS_REGION = "eu-west-1"
"#,
        )
        .unwrap();

        assert_eq!(config.max_parallel, 2);
        assert!(!config.isolate_workspaces);
        assert_eq!(config.terraform.binary, "tofu");
        assert_eq!(config.terraform.max_retries, 1);
        assert_eq!(config.terraform.apply_timeout_secs, 3600);
        assert_eq!(
            config.terraform.env.get("AWS_REGION").map(String::as_str),
            Some("eu-west-1")
        );
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let err = HarnessConfig::from_toml_str("max_parallel = 0").unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_invalid_toml() {
        let err = HarnessConfig::from_toml_str("max_parallel = \"many\"").unwrap_err();
        assert!(matches!(err, HarnessError::Toml(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HarnessConfig::default();
        config
            .apply_env([
                (ENV_TERRAFORM_BIN, "/opt/terraform"),
                (ENV_MAX_PARALLEL, "3"),
                (ENV_NO_ISOLATE, "1"),
                ("UNRELATED", "x"),
            ])
            .unwrap();

        assert_eq!(config.terraform.binary, "/opt/terraform");
        assert_eq!(config.max_parallel, 3);
        assert!(!config.isolate_workspaces);
    }

    #[test]
    fn test_env_false_keeps_isolation() {
        let mut config = HarnessConfig::default();
        config.apply_env([(ENV_NO_ISOLATE, "false")]).unwrap();
        assert!(config.isolate_workspaces);

        let err = config.apply_env([(ENV_MAX_PARALLEL, "lots")]).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ci.toml");
        fs::write(&path, "max_parallel = 5\n").unwrap();

        let config = HarnessConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_parallel, 5);

        let missing = HarnessConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(missing, HarnessError::Config(_)));
    }

    #[test]
    fn test_session_options() {
        let mut config = HarnessConfig::default();
        config.workspace_root = Some(PathBuf::from("/tmp/ws"));
        let options = config.session_options("asg");
        assert!(options.isolate);
        assert_eq!(options.name.as_deref(), Some("asg"));
        assert_eq!(options.workspace_root, Some(PathBuf::from("/tmp/ws")));

        config.isolate_workspaces = false;
        assert!(!config.session_options("asg").isolate);
    }
}
