//! Declarative suite files.
//!
//! ```yaml
//! vars:
//!   project: terratest
//! cases:
//!   - name: basic_instance
//!     template: examples/single-instance
//!     vars: { environment: test }
//!     expect:
//!       - output: instance_id
//!         not_empty: true
//! ```
//!
//! Template paths are relative to the suite file. Suite-level `vars` and
//! `env` apply to every case; a case's own entries win.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use infratest_iac::{TemplateHandle, VarValue};

use crate::assertion::Expectation;
use crate::error::{HarnessError, HarnessResult};
use crate::scheduler::TestCase;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    #[serde(default)]
    pub vars: BTreeMap<String, VarValue>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub cases: Vec<CaseSpec>,
}

/// One case as written in a suite file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseSpec {
    pub name: String,
    pub template: PathBuf,
    #[serde(default)]
    pub vars: BTreeMap<String, VarValue>,
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub backend_config: BTreeMap<String, String>,
    #[serde(default)]
    pub expect: Vec<Expectation>,
}

/// A parsed suite with template paths resolved against its directory.
#[derive(Debug, Clone)]
pub struct Suite {
    base_dir: PathBuf,
    file: SuiteFile,
}

impl Suite {
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HarnessError::Suite(format!("cannot read {}: {}", path.display(), e))
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        debug!("Loaded suite {:?}", path);
        Self::from_yaml_str(&content, base_dir)
    }

    pub fn from_yaml_str(content: &str, base_dir: impl Into<PathBuf>) -> HarnessResult<Self> {
        let file: SuiteFile = serde_yaml::from_str(content)?;
        let suite = Self {
            base_dir: base_dir.into(),
            file,
        };
        suite.validate()?;
        Ok(suite)
    }

    fn validate(&self) -> HarnessResult<()> {
        if self.file.cases.is_empty() {
            return Err(HarnessError::Suite("suite defines no cases".to_string()));
        }
        let mut names = HashSet::new();
        for case in &self.file.cases {
            if case.name.trim().is_empty() {
                return Err(HarnessError::Suite("case name must not be empty".to_string()));
            }
            if !names.insert(case.name.as_str()) {
                return Err(HarnessError::DuplicateCase(case.name.clone()));
            }
            if let Some(e) = case.expect.iter().find(|e| e.output.trim().is_empty()) {
                return Err(HarnessError::Suite(format!(
                    "case '{}' has an expectation without an output name: {:?}",
                    case.name, e
                )));
            }
            for assertion in case.expect.iter().flat_map(Expectation::assertions) {
                assertion.validate().map_err(|e| {
                    HarnessError::Suite(format!("case '{}': {}", case.name, e))
                })?;
            }
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn cases(&self) -> &[CaseSpec] {
        &self.file.cases
    }

    pub fn case_names(&self) -> Vec<&str> {
        self.file.cases.iter().map(|c| c.name.as_str()).collect()
    }

    /// Cases to run; all of them when `names` is empty.
    pub fn select(&self, names: &[String]) -> HarnessResult<Vec<&CaseSpec>> {
        if names.is_empty() {
            return Ok(self.file.cases.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.file
                    .cases
                    .iter()
                    .find(|c| &c.name == name)
                    .ok_or_else(|| {
                        HarnessError::Suite(format!(
                            "unknown case '{}' (available: {})",
                            name,
                            self.case_names().join(", ")
                        ))
                    })
            })
            .collect()
    }

    /// Template handle for a case, suite defaults merged in.
    pub fn handle(&self, case: &CaseSpec) -> TemplateHandle {
        let root = if case.template.is_absolute() {
            case.template.clone()
        } else {
            self.base_dir.join(&case.template)
        };

        let mut handle = TemplateHandle::new(root);
        handle.vars = self.file.vars.clone();
        handle.vars.extend(case.vars.clone());
        handle.env = self.file.env.clone();
        handle.env.extend(case.env.clone());
        handle.var_files = case.var_files.clone();
        handle.backend_config = case.backend_config.clone();
        handle
    }

    /// Build runnable cases, filtered by name.
    pub fn test_cases(&self, names: &[String]) -> HarnessResult<Vec<TestCase>> {
        Ok(self
            .select(names)?
            .into_iter()
            .map(|case| {
                let assertions = case
                    .expect
                    .iter()
                    .flat_map(Expectation::assertions)
                    .collect();
                TestCase::with_assertions(case.name.clone(), self.handle(case), assertions)
            })
            .collect())
    }
}
