//! Cross-stack references and the registry of published exports
//!
//! A reference is only a lookup key (`source stack`, `export name`). It never points
//! at the source stack itself, which is what keeps the source unaware of its
//! consumers. The real value exists only after the source stack has been applied
//! and its exports published to an [`ExportRegistry`].

use crate::core::validation::{ExportName, StackName};
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// By-name handle to another stack's export
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CrossStackReference {
    pub source_stack: StackName,
    pub export_name: ExportName,
}

impl CrossStackReference {
    /// Read the published value
    ///
    /// Fails with `UnresolvedExportAccess` while the source stack has not been applied.
    pub fn resolve(&self, registry: &ExportRegistry) -> Result<String> {
        registry.get(self)
    }
}

impl fmt::Display for CrossStackReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_stack, self.export_name)
    }
}

/// Handle returned when a stack publishes an export
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportHandle {
    pub stack: StackName,
    pub export_name: ExportName,
}

impl ExportHandle {
    /// The lookup key a consumer would hold for this export
    pub fn as_reference(&self) -> CrossStackReference {
        CrossStackReference {
            source_stack: self.stack.clone(),
            export_name: self.export_name.clone(),
        }
    }
}

/// Export values published by applied stacks
#[derive(Debug, Clone, Default)]
pub struct ExportRegistry {
    published: HashMap<StackName, BTreeMap<ExportName, String>>,
}

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the real export values of an applied stack
    ///
    /// Replaces whatever the stack published before.
    pub fn publish(&mut self, stack: StackName, values: BTreeMap<ExportName, String>) {
        self.published.insert(stack, values);
    }

    /// Drop the exports of a stack that has been torn down
    pub fn retract(&mut self, stack: &StackName) -> bool {
        self.published.remove(stack).is_some()
    }

    /// True once the stack has been applied
    pub fn is_published(&self, stack: &StackName) -> bool {
        self.published.contains_key(stack)
    }

    /// Look up a published value
    pub fn get(&self, reference: &CrossStackReference) -> Result<String> {
        let exports = self.published.get(&reference.source_stack).ok_or_else(|| {
            StackError::UnresolvedExportAccess {
                stack: reference.source_stack.to_string(),
                export: reference.export_name.to_string(),
            }
        })?;

        exports
            .get(&reference.export_name)
            .cloned()
            .ok_or_else(|| StackError::UnknownExport {
                stack: reference.source_stack.to_string(),
                export: reference.export_name.to_string(),
            })
    }

    /// All values published by a stack
    pub fn exports_of(&self, stack: &StackName) -> Option<&BTreeMap<ExportName, String>> {
        self.published.get(stack)
    }
}
