//! Storage stack: the private origin bucket and the identities allowed to manage it

use crate::core::app::{App, StackId};
use crate::core::iam::{AccessPolicySynthesizer, ActionProfile, PolicyDocument, Principal};
use crate::core::reference::ExportHandle;
use crate::core::resource::{RemovalPolicy, ResourceDescriptor, ResourceHandle, ResourceKind};
use crate::core::stack::StackProps;
use crate::core::value::{Attribute, Value};
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Name of the managed policy granting read/write access to the bucket
pub const MANAGED_POLICY_NAME: &str = "s3BucketBucketAccess";

/// Name of the role the managed policy is attached to
pub const ROLE_NAME: &str = "s3BucketRole";

/// Name of the group the managed policy is attached to
pub const GROUP_NAME: &str = "s3BucketAccess";

/// Service allowed to assume the role
pub const ROLE_SERVICE: &str = "s3.amazonaws.com";

/// Options of the storage stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageStackProps {
    #[serde(flatten)]
    pub stack: StackProps,

    /// Empty the bucket before deleting it on teardown
    pub auto_delete_objects: bool,

    /// Fate of the bucket on teardown
    pub removal_policy: RemovalPolicy,

    /// Name other stacks import the bucket name under
    pub export_name: String,

    /// Physical bucket name; generated by the backend when absent
    pub bucket_name: Option<String>,
}

impl Default for StorageStackProps {
    fn default() -> Self {
        StorageStackProps {
            stack: StackProps::default(),
            auto_delete_objects: false,
            removal_policy: RemovalPolicy::Retain,
            export_name: "my-bucket".to_string(),
            bucket_name: None,
        }
    }
}

/// Handles to everything the storage stack declared
#[derive(Debug, Clone)]
pub struct StorageStack {
    pub id: StackId,
    pub bucket: ResourceHandle,
    pub role: ResourceHandle,
    pub group: ResourceHandle,
    pub managed_policy: ResourceHandle,
    /// Export carrying the bucket's physical name
    pub bucket_name: ExportHandle,
}

impl StorageStack {
    /// Add the storage stack to `app`
    pub fn build(app: &mut App, name: &str, props: StorageStackProps) -> Result<Self> {
        if props.auto_delete_objects && props.removal_policy != RemovalPolicy::Destroy {
            return Err(StackError::Config(
                "auto_delete_objects requires removal_policy = \"destroy\"".to_string(),
            ));
        }

        app.build_stack(name, props.stack.clone(), |app, id| {
            let stack = app.stack_mut(id);

            let bucket = stack.declare(
                ResourceDescriptor::new(ResourceKind::Bucket, "Bucket")?
                    .with_optional("BucketName", props.bucket_name.clone())
                    .with("Versioned", false)
                    .with("PublicReadAccess", false)
                    .with("Encryption", "S3_MANAGED")
                    .with(
                        "BlockPublicAccess",
                        Value::map([
                            ("BlockPublicAcls", true),
                            ("BlockPublicPolicy", true),
                            ("IgnorePublicAcls", true),
                            ("RestrictPublicBuckets", true),
                        ]),
                    )
                    .with("AutoDeleteObjects", props.auto_delete_objects)
                    .with_removal_policy(props.removal_policy),
            )?;

            let role = stack.declare(
                ResourceDescriptor::new(ResourceKind::Role, "Role")?
                    .with("RoleName", ROLE_NAME)
                    .with("Description", "S3 bucket access")
                    .with(
                        "AssumedBy",
                        Principal::Service(ROLE_SERVICE.to_string()).to_value(),
                    ),
            )?;

            let group = stack.declare(
                ResourceDescriptor::new(ResourceKind::Group, "Group")?.with("GroupName", GROUP_NAME),
            )?;

            let mut document = PolicyDocument::new();
            document.add_statement(AccessPolicySynthesizer::identity_statement(
                &bucket,
                ActionProfile::ReadWrite,
            ));
            let managed_policy = stack.declare(
                ResourceDescriptor::new(ResourceKind::ManagedPolicy, "Policy")?
                    .with("ManagedPolicyName", MANAGED_POLICY_NAME)
                    .with(
                        "Description",
                        "Allows uploading and downloading object from S3 bucket",
                    )
                    .with("PolicyDocument", document.to_value())
                    .with("Roles", Value::list([role.name()]))
                    .with("Groups", Value::list([group.name()])),
            )?;

            let bucket_name =
                stack.export_attribute(props.export_name.as_str(), &bucket, Attribute::Name)?;

            info!(
                "Declared storage stack '{}' exporting '{}'",
                name, bucket_name.export_name
            );

            Ok(StorageStack {
                id,
                bucket,
                role,
                group,
                managed_policy,
                bucket_name,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::iam::Action;

    #[test]
    fn test_default_bucket_is_private_and_retained() {
        let mut app = App::new();
        let storage = StorageStack::build(&mut app, "s3BucketStack", Default::default()).unwrap();
        let stack = app.stack(storage.id);

        let bucket = stack.resource("Bucket").unwrap();
        assert_eq!(bucket.removal_policy(), RemovalPolicy::Retain);
        assert_eq!(bucket.get("Versioned"), Some(&Value::Bool(false)));
        assert_eq!(bucket.get("PublicReadAccess"), Some(&Value::Bool(false)));
        assert_eq!(bucket.get("AutoDeleteObjects"), Some(&Value::Bool(false)));
        assert_eq!(bucket.get("Encryption"), Some(&Value::from("S3_MANAGED")));
        assert!(bucket.get("BucketName").is_none());
    }

    #[test]
    fn test_exports_bucket_name() {
        let mut app = App::new();
        let storage = StorageStack::build(&mut app, "s3BucketStack", Default::default()).unwrap();
        let stack = app.stack(storage.id);

        assert_eq!(storage.bucket_name.export_name.as_str(), "my-bucket");
        assert_eq!(
            stack.exports().get(&storage.bucket_name.export_name),
            Some(&storage.bucket.name())
        );
    }

    #[test]
    fn test_managed_policy_is_scoped_read_write() {
        let mut app = App::new();
        let storage = StorageStack::build(&mut app, "s3BucketStack", Default::default()).unwrap();
        let stack = app.stack(storage.id);
        let policy = stack.resource("Policy").unwrap();

        assert_eq!(
            policy.get("ManagedPolicyName"),
            Some(&Value::from(MANAGED_POLICY_NAME))
        );
        assert_eq!(
            policy.get("Roles"),
            Some(&Value::list([storage.role.name()]))
        );

        let statement = AccessPolicySynthesizer::identity_statement(
            &storage.bucket,
            ActionProfile::ReadWrite,
        );
        assert!(statement.actions.contains(&Action::DeleteObject));
        let mut expected = PolicyDocument::new();
        expected.add_statement(statement);
        assert_eq!(policy.get("PolicyDocument"), Some(&expected.to_value()));
    }

    #[test]
    fn test_auto_delete_needs_destroy() {
        let mut app = App::new();
        let props = StorageStackProps {
            auto_delete_objects: true,
            ..Default::default()
        };
        assert!(matches!(
            StorageStack::build(&mut app, "s3BucketStack", props),
            Err(StackError::Config(_))
        ));
        assert!(app.is_empty());

        let props = StorageStackProps {
            auto_delete_objects: true,
            removal_policy: RemovalPolicy::Destroy,
            ..Default::default()
        };
        assert!(StorageStack::build(&mut app, "s3BucketStack", props).is_ok());
    }
}
