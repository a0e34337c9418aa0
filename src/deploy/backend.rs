//! The provisioning backend seam
//!
//! The orchestrator decides what to apply and in which order; the backend decides how
//! a resource comes into existence. Cross-stack references are already substituted
//! when a stack reaches the backend, leaving only same-stack attribute tokens.

use crate::core::resource::ResourceDescriptor;
use crate::core::stack::StackProps;
use crate::core::validation::{ExportName, LogicalName, StackName};
use crate::core::value::Value;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A stack ready for the backend: bucket policies rendered, imports substituted
#[derive(Debug, Clone)]
pub struct ResolvedStack {
    pub name: StackName,
    pub props: StackProps,
    pub resources: Vec<ResourceDescriptor>,
    pub exports: BTreeMap<ExportName, Value>,
    pub outputs: BTreeMap<LogicalName, Value>,
}

/// Outcome of applying one stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// First apply of the stack
    Created,
    /// The stack existed and was applied again
    Updated,
}

/// What the backend reports after applying a stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub stack: StackName,
    pub status: DeploymentStatus,
    /// Real values of the stack's exports
    pub exported_values: BTreeMap<ExportName, String>,
    pub outputs: BTreeMap<LogicalName, String>,
    pub physical_ids: BTreeMap<LogicalName, String>,
    pub completed_at: DateTime<Utc>,
}

impl DeploymentResult {
    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// What the backend reports after tearing a stack down
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub stack: String,
    /// Resources deleted, in deletion order
    pub deleted: Vec<String>,
    /// Resources kept because of their removal policy
    pub retained: Vec<String>,
    /// Imported resources the stack referenced but never owned
    pub released: Vec<String>,
}

/// A backend operation stopped part way through
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct ApplyFailure {
    /// Resource being processed when the failure happened
    pub resource: Option<String>,
    /// Resources already processed, which stay as they are
    pub completed: Vec<String>,
    pub reason: String,
}

impl ApplyFailure {
    pub fn at(resource: &LogicalName, completed: &[String], reason: impl Into<String>) -> Self {
        ApplyFailure {
            resource: Some(resource.to_string()),
            completed: completed.to_vec(),
            reason: reason.into(),
        }
    }
}

/// Creates and destroys provider resources
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Create or update every resource of the stack, in declaration order
    async fn apply(&self, stack: &ResolvedStack) -> Result<DeploymentResult, ApplyFailure>;

    /// Remove the stack's resources in reverse order, honouring removal policies
    async fn destroy(&self, stack: &ResolvedStack) -> Result<TeardownReport, ApplyFailure>;
}
