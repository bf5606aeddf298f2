//! Lifecycle driver abstraction.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IacResult;
use crate::output::{ApplyResult, Outputs};
use crate::template::TemplateHandle;

/// Engine step that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStep {
    Init,
    Apply,
    Output,
    Destroy,
}

impl LifecycleStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Apply => "apply",
            Self::Output => "output",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provisions and tears down a template.
#[async_trait]
pub trait LifecycleDriver: Send + Sync {
    /// Init and apply the template, then read its outputs.
    ///
    /// Fails with `IacError::Provision` when any step exits non-zero.
    async fn apply(&self, handle: &TemplateHandle) -> IacResult<ApplyResult>;

    /// Destroy everything created for the template.
    ///
    /// Succeeds when nothing is provisioned. Fails with `IacError::Teardown`.
    async fn destroy(&self, handle: &TemplateHandle) -> IacResult<()>;

    /// Read the current outputs without applying.
    async fn outputs(&self, handle: &TemplateHandle) -> IacResult<Outputs>;
}
