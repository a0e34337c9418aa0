//! Error types for stack declaration and deployment

use thiserror::Error;

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, StackError>;

/// Declaration and deployment errors
#[derive(Error, Debug)]
pub enum StackError {
    /// A resource with the same logical name already exists in the stack
    #[error("Duplicate logical name '{logical_name}' in stack '{stack}'")]
    DuplicateLogicalName { stack: String, logical_name: String },

    /// An export with the same name was already published by the stack
    #[error("Export name '{export}' already used in stack '{stack}'")]
    ExportNameCollision { stack: String, export: String },

    /// Adding a reference would close a cycle between stacks
    #[error("Cyclic stack dependency: {}", .cycle.join(" -> "))]
    CyclicStackDependency { cycle: Vec<String> },

    /// TTL bounds violate min <= default <= max
    #[error("Invalid TTL bounds: min={min}s default={default}s max={max}s")]
    InvalidTtlBounds { min: u64, default: u64, max: u64 },

    /// An export was read before its source stack finished applying
    #[error("Export '{export}' of stack '{stack}' read before the stack was applied")]
    UnresolvedExportAccess { stack: String, export: String },

    /// The backend failed part way through applying a stack
    #[error(
        "Partial apply failure in stack '{stack}' at resource '{}': {reason}",
        .resource.as_deref().unwrap_or("<none>")
    )]
    PartialApplyFailure {
        stack: String,
        resource: Option<String>,
        applied_resources: Vec<String>,
        applied_stacks: Vec<String>,
        reason: String,
    },

    /// Stack, logical or export name failed validation
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// Two stacks in one app share a name
    #[error("Duplicate stack name: {0}")]
    DuplicateStackName(String),

    /// Stack is not part of the app
    #[error("Unknown stack: {0}")]
    UnknownStack(String),

    /// Resource is not declared in the stack
    #[error("Unknown resource '{logical_name}' in stack '{stack}'")]
    UnknownResource { stack: String, logical_name: String },

    /// Export is not published by the stack
    #[error("Stack '{stack}' has no export named '{export}'")]
    UnknownExport { stack: String, export: String },

    /// Configuration uses a cross-stack reference the stack never imported
    #[error("Stack '{stack}' uses '{source_stack}:{export}' without importing it")]
    UndeclaredImport {
        stack: String,
        source_stack: String,
        export: String,
    },

    /// Resource handle belongs to another stack
    #[error("Resource '{logical_name}' belongs to stack '{owner}', not '{stack}'")]
    ForeignResource {
        stack: String,
        owner: String,
        logical_name: String,
    },

    /// Access can only be granted on buckets
    #[error("Cannot attach an access grant to '{logical_name}' of kind {kind}")]
    UnsupportedGrantTarget { logical_name: String, kind: String },

    /// Consumer and source live in different regions without cross-region references
    #[error(
        "Stack '{consumer}' ({consumer_region}) cannot reference '{source_stack}' ({source_region}) \
         without cross-region references enabled"
    )]
    CrossRegionReferencesDisabled {
        consumer: String,
        consumer_region: String,
        source_stack: String,
        source_region: String,
    },

    /// A resource attribute was requested before the resource was provisioned
    #[error("Attribute {attribute} of '{logical_name}' is not available")]
    UnresolvedAttribute {
        logical_name: String,
        attribute: String,
    },

    /// Distribution configuration is not valid
    #[error("Invalid distribution configuration: {0}")]
    InvalidDistribution(String),

    /// Teardown refused because the stack is termination protected
    #[error("Stack '{0}' has termination protection enabled")]
    TerminationProtected(String),

    /// The backend could not destroy a stack
    #[error("Teardown of stack '{stack}' failed at resource '{resource}': {reason}")]
    TeardownFailure {
        stack: String,
        resource: String,
        reason: String,
    },

    /// Deployment configuration is not valid
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StackError {
    /// True for structural errors that must surface while the stacks are being declared
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            StackError::DuplicateLogicalName { .. }
                | StackError::ExportNameCollision { .. }
                | StackError::CyclicStackDependency { .. }
                | StackError::InvalidTtlBounds { .. }
                | StackError::InvalidName(_)
                | StackError::DuplicateStackName(_)
                | StackError::UnknownResource { .. }
                | StackError::UnknownExport { .. }
                | StackError::UndeclaredImport { .. }
                | StackError::ForeignResource { .. }
                | StackError::UnsupportedGrantTarget { .. }
                | StackError::CrossRegionReferencesDisabled { .. }
                | StackError::InvalidDistribution(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = StackError::CyclicStackDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic stack dependency: a -> b -> a");
        assert!(err.is_declaration_error());
    }

    #[test]
    fn test_partial_failure_is_not_declaration_error() {
        let err = StackError::PartialApplyFailure {
            stack: "delivery".into(),
            resource: Some("Distribution".into()),
            applied_resources: vec!["OriginBucket".into()],
            applied_stacks: vec!["storage".into()],
            reason: "quota exceeded".into(),
        };
        assert!(!err.is_declaration_error());
        assert!(err.to_string().contains("Distribution"));
    }
}
