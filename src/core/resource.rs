//! Resource descriptors
//!
//! A descriptor is the immutable declaration of one provisioned entity. It is built
//! with a consuming builder and, once handed to [`Stack::declare`], can only be read.
//!
//! [`Stack::declare`]: crate::core::stack::Stack::declare

use crate::core::validation::{LogicalName, StackName};
use crate::core::value::{Attribute, AttributeRef, Value};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of resource the provisioning backend understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Object-storage bucket created by the stack
    Bucket,
    /// Existing bucket looked up by name, never created or destroyed
    ImportedBucket,
    /// Resource policy attached to a bucket
    BucketPolicy,
    /// Identity-based policy attachable to roles and groups
    ManagedPolicy,
    Role,
    Group,
    /// Content-delivery distribution
    Distribution,
    /// Identity the distribution uses to read its origin
    OriginAccessIdentity,
    CachePolicy,
    OriginRequestPolicy,
}

impl ResourceKind {
    /// True for kinds a bucket policy grant may target
    pub fn is_bucket(&self) -> bool {
        matches!(self, ResourceKind::Bucket | ResourceKind::ImportedBucket)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What happens to a resource when its stack is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    /// Leave the resource in place
    #[default]
    Retain,
    /// Delete the resource with the stack
    Destroy,
}

/// Immutable declaration of one provisioned entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    kind: ResourceKind,
    logical_name: LogicalName,
    configuration: BTreeMap<String, Value>,
    removal_policy: RemovalPolicy,
}

impl ResourceDescriptor {
    /// Start a descriptor; the removal policy defaults to `Destroy`
    /// except for buckets, which default to `Retain`
    pub fn new<N>(kind: ResourceKind, logical_name: N) -> Result<Self>
    where
        N: TryInto<LogicalName, Error = crate::error::StackError>,
    {
        let removal_policy = if kind == ResourceKind::Bucket {
            RemovalPolicy::Retain
        } else {
            RemovalPolicy::Destroy
        };

        Ok(ResourceDescriptor {
            kind,
            logical_name: logical_name.try_into()?,
            configuration: BTreeMap::new(),
            removal_policy,
        })
    }

    /// Set a configuration key
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }

    /// Set a configuration key only when a value is present
    pub fn with_optional<V: Into<Value>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// Set the removal policy
    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn logical_name(&self) -> &LogicalName {
        &self.logical_name
    }

    pub fn configuration(&self) -> &BTreeMap<String, Value> {
        &self.configuration
    }

    /// Look up one configuration key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.configuration.get(key)
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    /// Same descriptor with every configuration value rewritten by `f`
    pub(crate) fn map_configuration(
        &self,
        f: impl Fn(&Value) -> Result<Value>,
    ) -> Result<ResourceDescriptor> {
        let configuration = self
            .configuration
            .iter()
            .map(|(k, v)| Ok((k.clone(), f(v)?)))
            .collect::<Result<_>>()?;

        Ok(ResourceDescriptor {
            kind: self.kind,
            logical_name: self.logical_name.clone(),
            configuration,
            removal_policy: self.removal_policy,
        })
    }
}

/// Handle to a declared resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub stack: StackName,
    pub logical_name: LogicalName,
    pub kind: ResourceKind,
}

impl ResourceHandle {
    /// Deferred value of one of the resource's attributes
    pub fn attr(&self, attribute: Attribute) -> Value {
        Value::Attr(AttributeRef {
            resource: self.logical_name.clone(),
            attribute,
        })
    }

    pub fn arn(&self) -> Value {
        self.attr(Attribute::Arn)
    }

    pub fn name(&self) -> Value {
        self.attr(Attribute::Name)
    }

    pub fn domain_name(&self) -> Value {
        self.attr(Attribute::DomainName)
    }

    pub fn id(&self) -> Value {
        self.attr(Attribute::Id)
    }

    /// ARN pattern covering every object inside a bucket
    pub fn arn_for_objects(&self, key_pattern: &str) -> Value {
        Value::join(vec![self.arn(), Value::from(format!("/{}", key_pattern))])
    }
}
