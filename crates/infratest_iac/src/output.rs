//! Output resolution from `terraform output -json`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IacError, IacResult};

/// Output value in its native shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    String(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl OutputValue {
    /// Convert a JSON value. Scalars become strings, arrays lists and
    /// objects maps; nested non-string elements are kept as JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::List(items.iter().map(scalar_to_string).collect()),
            Value::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                    .collect(),
            ),
            other => Self::String(scalar_to_string(other)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Whether the value carries no data.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Map(entries) => entries.is_empty(),
        }
    }

    /// Coerce to a string: lists are comma-joined, maps rendered as JSON.
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::List(items) => items.join(","),
            Self::Map(entries) => serde_json::to_string(entries).unwrap_or_default(),
        }
    }
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

/// One declared output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub value: OutputValue,
    /// Type as reported by the engine, e.g. `"string"` or `["list","string"]`
    pub declared_type: Value,
    pub sensitive: bool,
}

#[derive(Deserialize)]
struct RawOutput {
    value: Value,
    #[serde(rename = "type", default)]
    declared_type: Value,
    #[serde(default)]
    sensitive: bool,
}

/// Declared outputs of an applied template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outputs {
    entries: BTreeMap<String, OutputEntry>,
}

impl Outputs {
    /// Parse the JSON object printed by `output -json`.
    pub fn parse(json: &str) -> IacResult<Self> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let raw: BTreeMap<String, RawOutput> =
            serde_json::from_str(trimmed).map_err(|e| IacError::OutputParse(e.to_string()))?;

        let entries = raw
            .into_iter()
            .map(|(name, raw)| {
                let entry = OutputEntry {
                    value: OutputValue::from_json(&raw.value),
                    declared_type: raw.declared_type,
                    sensitive: raw.sensitive,
                };
                (name, entry)
            })
            .collect();

        Ok(Self { entries })
    }

    /// Build from plain values (no engine involved).
    pub fn from_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, OutputValue)>,
        K: Into<String>,
    {
        let entries = values
            .into_iter()
            .map(|(name, value)| {
                let entry = OutputEntry {
                    value,
                    declared_type: Value::Null,
                    sensitive: false,
                };
                (name.into(), entry)
            })
            .collect();
        Self { entries }
    }

    /// Look up a declared output.
    pub fn get(&self, name: &str) -> IacResult<&OutputValue> {
        self.entries
            .get(name)
            .map(|e| &e.value)
            .ok_or_else(|| IacError::MissingOutput {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Look up a declared output, coerced to a string. Empty is a valid result.
    pub fn get_string(&self, name: &str) -> IacResult<String> {
        self.get(name).map(OutputValue::to_plain_string)
    }

    pub fn entry(&self, name: &str) -> Option<&OutputEntry> {
        self.entries.get(name)
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|e| e.sensitive)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OutputEntry)> {
        self.entries.iter()
    }

    /// Display-safe rendering of a value; sensitive outputs are redacted.
    pub fn redacted(&self, name: &str) -> String {
        match self.entries.get(name) {
            Some(e) if e.sensitive => "<sensitive>".to_string(),
            Some(e) => e.value.to_plain_string(),
            None => "<missing>".to_string(),
        }
    }
}

/// Token for a successful apply, holding the outputs read right after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Directory the engine ran in
    pub workdir: PathBuf,
    pub applied_at: DateTime<Utc>,
    pub outputs: Outputs,
}

impl ApplyResult {
    pub fn new(workdir: impl Into<PathBuf>, outputs: Outputs) -> Self {
        Self {
            workdir: workdir.into(),
            applied_at: Utc::now(),
            outputs,
        }
    }

    /// Resolve a named output.
    pub fn output(&self, name: &str) -> IacResult<&OutputValue> {
        self.outputs.get(name)
    }

    /// Resolve a named output as a string.
    pub fn output_string(&self, name: &str) -> IacResult<String> {
        self.outputs.get_string(name)
    }
}
