//! Stacks: named, independently deployable sets of resources
//!
//! A stack owns its resources outright. Nothing registers itself implicitly: every
//! resource enters through [`Stack::declare`], which hands back a handle, and the
//! resource set stays an ordered, enumerable collection.

use crate::core::iam::{AccessGrant, PolicyDocument};
use crate::core::reference::{CrossStackReference, ExportHandle};
use crate::core::resource::{RemovalPolicy, ResourceDescriptor, ResourceHandle, ResourceKind};
use crate::core::validation::{ExportName, LogicalName, StackName};
use crate::core::value::{Attribute, Value};
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Stack construction parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackProps {
    /// Refuse teardown while set
    pub termination_protection: bool,

    /// Allow importing exports of stacks in another region
    pub cross_region_references: bool,

    /// Target region; `None` means the app default
    pub region: Option<String>,

    pub description: Option<String>,
}

/// Resource policy accumulated for one bucket of the stack
#[derive(Debug, Clone)]
pub struct AttachedPolicy {
    target: ResourceHandle,
    policy_name: LogicalName,
    document: PolicyDocument,
    grants: Vec<AccessGrant>,
}

impl AttachedPolicy {
    /// The resource this policy protects
    pub fn target(&self) -> &ResourceHandle {
        &self.target
    }

    /// Logical name of the rendered bucket-policy resource
    pub fn policy_name(&self) -> &LogicalName {
        &self.policy_name
    }

    pub fn document(&self) -> &PolicyDocument {
        &self.document
    }

    pub fn grants(&self) -> &[AccessGrant] {
        &self.grants
    }

    /// Append a grant and its statement, unless an equal grant is already present
    pub(crate) fn add_grant(&mut self, grant: AccessGrant) -> bool {
        if self.grants.iter().any(|g| g.key() == grant.key()) {
            return false;
        }
        self.document.add_statement(grant.statement().clone());
        self.grants.push(grant);
        true
    }

    fn to_descriptor(&self) -> Result<ResourceDescriptor> {
        Ok(
            ResourceDescriptor::new(ResourceKind::BucketPolicy, &self.policy_name)?
                .with("Bucket", self.target.name())
                .with("PolicyDocument", self.document.to_value())
                .with_removal_policy(RemovalPolicy::Destroy),
        )
    }
}

/// A named, deployable unit of resources and exports
#[derive(Debug, Clone)]
pub struct Stack {
    name: StackName,
    props: StackProps,
    resources: Vec<ResourceDescriptor>,
    taken: HashMap<LogicalName, ResourceKind>,
    exports: BTreeMap<ExportName, Value>,
    outputs: BTreeMap<LogicalName, Value>,
    imports: Vec<CrossStackReference>,
    attached_policies: Vec<AttachedPolicy>,
}

impl Stack {
    /// Create an empty stack
    ///
    /// Stacks that reference each other must live in the same [`App`] so that
    /// imports can be checked for cycles.
    ///
    /// [`App`]: crate::core::app::App
    pub fn new(name: StackName, props: StackProps) -> Self {
        Stack {
            name,
            props,
            resources: Vec::new(),
            taken: HashMap::new(),
            exports: BTreeMap::new(),
            outputs: BTreeMap::new(),
            imports: Vec::new(),
            attached_policies: Vec::new(),
        }
    }

    pub fn name(&self) -> &StackName {
        &self.name
    }

    pub fn props(&self) -> &StackProps {
        &self.props
    }

    /// Declared resources, in declaration order
    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    pub fn resource(&self, logical_name: &str) -> Option<&ResourceDescriptor> {
        self.resources
            .iter()
            .find(|r| r.logical_name().as_str() == logical_name)
    }

    pub fn exports(&self) -> &BTreeMap<ExportName, Value> {
        &self.exports
    }

    pub fn outputs(&self) -> &BTreeMap<LogicalName, Value> {
        &self.outputs
    }

    /// Cross-stack references this stack consumes
    pub fn imports(&self) -> &[CrossStackReference] {
        &self.imports
    }

    pub fn attached_policies(&self) -> &[AttachedPolicy] {
        &self.attached_policies
    }

    /// Attached policy protecting the given resource, if any grant was made
    pub fn attached_policy(&self, target: &LogicalName) -> Option<&AttachedPolicy> {
        self.attached_policies
            .iter()
            .find(|p| &p.target.logical_name == target)
    }

    /// Stacks this stack depends on, in first-import order, without duplicates
    pub fn dependencies(&self) -> Vec<&StackName> {
        let mut deps: Vec<&StackName> = Vec::new();
        for reference in &self.imports {
            if !deps.contains(&&reference.source_stack) {
                deps.push(&reference.source_stack);
            }
        }
        deps
    }

    /// Declare a resource
    ///
    /// Attribute tokens in the configuration may only point at resources declared
    /// earlier in this stack; cross-stack tokens must have been imported first.
    pub fn declare(&mut self, descriptor: ResourceDescriptor) -> Result<ResourceHandle> {
        let logical_name = descriptor.logical_name().clone();
        if self.taken.contains_key(&logical_name) {
            return Err(StackError::DuplicateLogicalName {
                stack: self.name.to_string(),
                logical_name: logical_name.to_string(),
            });
        }

        for value in descriptor.configuration().values() {
            self.check_tokens(value)?;
        }

        debug!(
            "Declaring {} '{}' in stack '{}'",
            descriptor.kind(),
            logical_name,
            self.name
        );

        let handle = ResourceHandle {
            stack: self.name.clone(),
            logical_name: logical_name.clone(),
            kind: descriptor.kind(),
        };
        self.taken.insert(logical_name, descriptor.kind());
        self.resources.push(descriptor);
        Ok(handle)
    }

    /// Publish a value under a stable name for other stacks to import
    pub fn export<N>(&mut self, name: N, value: impl Into<Value>) -> Result<ExportHandle>
    where
        N: TryInto<ExportName, Error = StackError>,
    {
        let export_name = name.try_into()?;
        if self.exports.contains_key(&export_name) {
            return Err(StackError::ExportNameCollision {
                stack: self.name.to_string(),
                export: export_name.to_string(),
            });
        }

        let value = value.into();
        self.check_tokens(&value)?;

        debug!("Stack '{}' exports '{}'", self.name, export_name);
        self.exports.insert(export_name.clone(), value);

        Ok(ExportHandle {
            stack: self.name.clone(),
            export_name,
        })
    }

    /// Export one attribute of a resource owned by this stack
    pub fn export_attribute<N>(
        &mut self,
        name: N,
        resource: &ResourceHandle,
        attribute: Attribute,
    ) -> Result<ExportHandle>
    where
        N: TryInto<ExportName, Error = StackError>,
    {
        self.check_owned(resource)?;
        self.export(name, resource.attr(attribute))
    }

    /// Record a deployment output such as a public URL
    pub fn add_output<N>(&mut self, name: N, value: impl Into<Value>) -> Result<()>
    where
        N: TryInto<LogicalName, Error = StackError>,
    {
        let name = name.try_into()?;
        if self.outputs.contains_key(&name) {
            return Err(StackError::DuplicateLogicalName {
                stack: self.name.to_string(),
                logical_name: name.to_string(),
            });
        }

        let value = value.into();
        self.check_tokens(&value)?;
        self.outputs.insert(name, value);
        Ok(())
    }

    /// Resources as handed to the backend: declared resources followed by one
    /// bucket policy per attached policy document
    pub fn rendered_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        let mut rendered = self.resources.clone();
        for policy in &self.attached_policies {
            rendered.push(policy.to_descriptor()?);
        }
        Ok(rendered)
    }

    pub(crate) fn record_import(&mut self, reference: CrossStackReference) {
        if !self.imports.contains(&reference) {
            self.imports.push(reference);
        }
    }

    /// Policy document attached to `target`, created on first use
    ///
    /// The first grant on a bucket reserves the logical name `<Bucket>Policy`.
    pub(crate) fn attached_policy_mut(
        &mut self,
        target: &ResourceHandle,
    ) -> Result<&mut AttachedPolicy> {
        self.check_owned(target)?;
        if !target.kind.is_bucket() {
            return Err(StackError::UnsupportedGrantTarget {
                logical_name: target.logical_name.to_string(),
                kind: target.kind.to_string(),
            });
        }

        let position = self
            .attached_policies
            .iter()
            .position(|p| p.target.logical_name == target.logical_name);

        let index = match position {
            Some(index) => index,
            None => {
                let policy_name = LogicalName::new(format!("{}Policy", target.logical_name))?;
                if self.taken.contains_key(&policy_name) {
                    return Err(StackError::DuplicateLogicalName {
                        stack: self.name.to_string(),
                        logical_name: policy_name.to_string(),
                    });
                }
                debug!(
                    "Attaching policy '{}' to '{}' in stack '{}'",
                    policy_name, target.logical_name, self.name
                );
                self.taken
                    .insert(policy_name.clone(), ResourceKind::BucketPolicy);
                self.attached_policies.push(AttachedPolicy {
                    target: target.clone(),
                    policy_name,
                    document: PolicyDocument::new(),
                    grants: Vec::new(),
                });
                self.attached_policies.len() - 1
            }
        };

        Ok(&mut self.attached_policies[index])
    }

    fn check_owned(&self, resource: &ResourceHandle) -> Result<()> {
        if resource.stack != self.name {
            return Err(StackError::ForeignResource {
                stack: self.name.to_string(),
                owner: resource.stack.to_string(),
                logical_name: resource.logical_name.to_string(),
            });
        }
        match self.taken.get(&resource.logical_name) {
            Some(kind) if *kind == resource.kind => Ok(()),
            _ => Err(StackError::UnknownResource {
                stack: self.name.to_string(),
                logical_name: resource.logical_name.to_string(),
            }),
        }
    }

    fn check_tokens(&self, value: &Value) -> Result<()> {
        for attr in value.attribute_refs() {
            let declared = self
                .resources
                .iter()
                .any(|r| r.logical_name() == &attr.resource);
            if !declared {
                return Err(StackError::UnknownResource {
                    stack: self.name.to_string(),
                    logical_name: attr.resource.to_string(),
                });
            }
        }

        for reference in value.imports() {
            if !self.imports.contains(reference) {
                return Err(StackError::UndeclaredImport {
                    stack: self.name.to_string(),
                    source_stack: reference.source_stack.to_string(),
                    export: reference.export_name.to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(name: &str) -> Stack {
        Stack::new(StackName::new(name).unwrap(), StackProps::default())
    }

    fn bucket(name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(ResourceKind::Bucket, name).unwrap()
    }

    #[test]
    fn test_declare_returns_handle() {
        let mut s = stack("storage");
        let handle = s.declare(bucket("Bucket")).unwrap();
        assert_eq!(handle.logical_name.as_str(), "Bucket");
        assert_eq!(handle.stack.as_str(), "storage");
        assert_eq!(s.resources().len(), 1);
    }

    #[test]
    fn test_duplicate_logical_name() {
        let mut s = stack("storage");
        s.declare(bucket("Bucket")).unwrap();
        let err = s.declare(bucket("Bucket")).unwrap_err();
        assert!(matches!(err, StackError::DuplicateLogicalName { .. }));
        assert_eq!(s.resources().len(), 1);
    }

    #[test]
    fn test_export_name_collision() {
        let mut s = stack("storage");
        let b = s.declare(bucket("Bucket")).unwrap();
        s.export("my-bucket", b.name()).unwrap();
        let err = s.export("my-bucket", "literal").unwrap_err();
        assert!(matches!(err, StackError::ExportNameCollision { .. }));
    }

    #[test]
    fn test_export_of_foreign_resource_rejected() {
        let mut a = stack("a");
        let mut b = stack("b");
        let foreign = a.declare(bucket("Bucket")).unwrap();
        b.declare(bucket("Bucket")).unwrap();

        let err = b
            .export_attribute("leak", &foreign, Attribute::Name)
            .unwrap_err();
        assert!(matches!(err, StackError::ForeignResource { .. }));
    }

    #[test]
    fn test_reference_to_undeclared_resource() {
        let mut s = stack("storage");
        let ghost = ResourceHandle {
            stack: s.name().clone(),
            logical_name: LogicalName::new("Ghost").unwrap(),
            kind: ResourceKind::Bucket,
        };
        let policy = ResourceDescriptor::new(ResourceKind::ManagedPolicy, "Policy")
            .unwrap()
            .with("Resource", ghost.arn());
        assert!(matches!(
            s.declare(policy),
            Err(StackError::UnknownResource { .. })
        ));
        assert!(matches!(
            s.export("ghost", ghost.name()),
            Err(StackError::UnknownResource { .. })
        ));
    }

    #[test]
    fn test_unimported_reference_rejected() {
        let mut s = stack("delivery");
        let reference = CrossStackReference {
            source_stack: StackName::new("storage").unwrap(),
            export_name: ExportName::new("my-bucket").unwrap(),
        };
        let imported = ResourceDescriptor::new(ResourceKind::ImportedBucket, "OriginBucket")
            .unwrap()
            .with("BucketName", reference.clone());
        assert!(matches!(
            s.declare(imported.clone()),
            Err(StackError::UndeclaredImport { .. })
        ));

        s.record_import(reference);
        assert!(s.declare(imported).is_ok());
        assert_eq!(s.dependencies().len(), 1);
    }

    #[test]
    fn test_duplicate_output() {
        let mut s = stack("delivery");
        s.add_output("CloudFrontDomain", "https://example").unwrap();
        assert!(matches!(
            s.add_output("CloudFrontDomain", "https://other"),
            Err(StackError::DuplicateLogicalName { .. })
        ));
    }
}
