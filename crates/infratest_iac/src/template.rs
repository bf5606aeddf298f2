//! Template handles and input variables.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IacError, IacResult};

/// Input variable value passed to the engine with `-var`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<VarValue>),
    Map(BTreeMap<String, VarValue>),
}

impl VarValue {
    /// Render for a `-var name=value` argument.
    ///
    /// Top-level strings are passed raw; everything else uses HCL syntax.
    pub fn to_cli_value(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_hcl(),
        }
    }

    /// Render as an HCL expression.
    pub fn to_hcl(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => quote(s),
            Self::List(items) => {
                let items: Vec<String> = items.iter().map(VarValue::to_hcl).collect();
                format!("[{}]", items.join(", "))
            }
            Self::Map(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{} = {}", quote(k), v.to_hcl()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
        }
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_cli_value())
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for VarValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for VarValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for VarValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<VarValue>> From<Vec<T>> for VarValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Reference to a template directory plus the inputs to apply it with.
///
/// The driver only ever borrows a handle; once a session owns it, it is
/// not mutated. Isolation produces a new handle via [`TemplateHandle::with_root`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateHandle {
    /// Directory holding the template
    pub root: PathBuf,
    /// Input variables
    #[serde(default)]
    pub vars: BTreeMap<String, VarValue>,
    /// Variable files, relative to `root`
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    /// Extra environment for the engine
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Backend settings passed to init
    #[serde(default)]
    pub backend_config: BTreeMap<String, String>,
}

impl TemplateHandle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            vars: BTreeMap::new(),
            var_files: Vec::new(),
            env: BTreeMap::new(),
            backend_config: BTreeMap::new(),
        }
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<VarValue>,
    {
        for (name, value) in vars {
            self.vars.insert(name.into(), value.into());
        }
        self
    }

    pub fn var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn backend_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.backend_config.insert(key.into(), value.into());
        self
    }

    /// Same inputs, different template directory.
    pub fn with_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..self.clone()
        }
    }

    /// Template directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Short name for logs (last path component).
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    /// Ensure the template directory exists and is readable.
    pub fn validate(&self) -> IacResult<()> {
        if !self.root.is_dir() {
            return Err(IacError::TemplateNotFound(self.root.clone()));
        }
        std::fs::read_dir(&self.root)?;
        Ok(())
    }

    /// `-var` / `-var-file` arguments in a stable order.
    pub fn var_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.vars.len() * 2 + self.var_files.len() * 2);
        for (name, value) in &self.vars {
            args.push("-var".to_string());
            args.push(format!("{}={}", name, value.to_cli_value()));
        }
        for file in &self.var_files {
            args.push("-var-file".to_string());
            args.push(file.display().to_string());
        }
        args
    }
}
