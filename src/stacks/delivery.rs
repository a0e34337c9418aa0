//! Delivery stack: a distribution in front of a bucket owned by another stack
//!
//! The bucket arrives only as an imported name. Read access for the distribution's
//! origin-access identity is granted on the imported bucket from this side, so the
//! storage stack never learns about its consumer.

use crate::core::app::{App, StackId};
use crate::core::cdn::{CachePolicy, DistributionConfig, DistributionOrigin, OriginRequestPolicy};
use crate::core::iam::{AccessGrant, AccessPolicySynthesizer, ActionProfile, Principal};
use crate::core::reference::{CrossStackReference, ExportHandle};
use crate::core::resource::{ResourceDescriptor, ResourceHandle, ResourceKind};
use crate::core::stack::StackProps;
use crate::core::value::{Attribute, Value};
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Output carrying the public URL of the distribution
pub const DOMAIN_OUTPUT: &str = "CloudFrontDomain";

/// Options of the delivery stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryStackProps {
    #[serde(flatten)]
    pub stack: StackProps,
    pub distribution: DistributionConfig,
    pub cache_policy: CachePolicy,
    pub origin_request_policy: OriginRequestPolicy,
}

impl Default for DeliveryStackProps {
    fn default() -> Self {
        DeliveryStackProps {
            stack: StackProps::default(),
            distribution: DistributionConfig::default(),
            cache_policy: CachePolicy::default()
                .with_comment("Policy to customize parameters that affect the cache key"),
            origin_request_policy: OriginRequestPolicy::default()
                .with_comment("Policy to forward custom headers / cookies to origin"),
        }
    }
}

/// Handles to everything the delivery stack declared
#[derive(Debug, Clone)]
pub struct DeliveryStack {
    pub id: StackId,
    pub origin_reference: CrossStackReference,
    pub origin_bucket: ResourceHandle,
    pub access_identity: ResourceHandle,
    pub grant: AccessGrant,
    pub cache_policy: ResourceHandle,
    pub origin_request_policy: ResourceHandle,
    pub distribution: ResourceHandle,
}

impl DeliveryStack {
    /// Add the delivery stack to `app`, serving the bucket named by `origin_bucket_name`
    pub fn build(
        app: &mut App,
        name: &str,
        origin_bucket_name: &ExportHandle,
        props: DeliveryStackProps,
    ) -> Result<Self> {
        let source = app
            .stack_id(origin_bucket_name.stack.as_str())
            .ok_or_else(|| StackError::UnknownStack(origin_bucket_name.stack.to_string()))?;

        // Checked before the stack enters the app; anything later is undone by build_stack
        props.cache_policy.ttl().validate()?;
        props.distribution.validate()?;

        app.build_stack(name, props.stack.clone(), |app, id| {
            let origin_reference =
                app.import_reference(id, source, &origin_bucket_name.export_name)?;
            let stack = app.stack_mut(id);

            let origin_bucket = stack.declare(
                ResourceDescriptor::new(ResourceKind::ImportedBucket, "OriginBucket")?
                    .with("BucketName", origin_reference.clone()),
            )?;

            let access_identity = stack.declare(
                ResourceDescriptor::new(ResourceKind::OriginAccessIdentity, "DistributionOAI")?
                    .with("Comment", "Allows access to S3 bucket!"),
            )?;

            let grant = AccessPolicySynthesizer::grant_access(
                stack,
                Principal::CanonicalUser(access_identity.attr(Attribute::CanonicalUserId)),
                &origin_bucket,
                ActionProfile::ReadOnly,
            )?;

            let origin_request_policy = stack
                .declare(props.origin_request_policy.to_descriptor("OriginRequestPolicy")?)?;
            let cache_policy =
                stack.declare(props.cache_policy.to_descriptor("CachePolicy")?)?;

            let origin = DistributionOrigin {
                bucket: origin_bucket.clone(),
                access_identity: access_identity.clone(),
                cache_policy: cache_policy.clone(),
                origin_request_policy: origin_request_policy.clone(),
            };
            let distribution = stack
                .declare(props.distribution.to_descriptor("Distribution", &origin)?)?;

            stack.add_output(
                DOMAIN_OUTPUT,
                Value::join(vec![Value::from("https://"), distribution.domain_name()]),
            )?;

            info!(
                "Declared delivery stack '{}' importing '{}'",
                name, origin_reference
            );

            Ok(DeliveryStack {
                id,
                origin_reference,
                origin_bucket,
                access_identity,
                grant,
                cache_policy,
                origin_request_policy,
                distribution,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cdn::TtlBounds;
    use crate::core::resource::RemovalPolicy;
    use crate::stacks::storage::{StorageStack, StorageStackProps};

    fn app_with_storage() -> (App, StorageStack) {
        let mut app = App::new();
        let storage =
            StorageStack::build(&mut app, "s3BucketStack", StorageStackProps::default()).unwrap();
        (app, storage)
    }

    #[test]
    fn test_delivery_imports_bucket_by_name() {
        let (mut app, storage) = app_with_storage();
        let delivery = DeliveryStack::build(
            &mut app,
            "cloudFrontStack",
            &storage.bucket_name,
            DeliveryStackProps::default(),
        )
        .unwrap();

        let stack = app.stack(delivery.id);
        assert_eq!(stack.dependencies()[0].as_str(), "s3BucketStack");
        assert_eq!(
            stack.resource("OriginBucket").unwrap().get("BucketName"),
            Some(&Value::Import(storage.bucket_name.as_reference()))
        );

        // The storage stack is untouched by its consumer
        assert!(app.stack(storage.id).imports().is_empty());
        assert!(app.stack(storage.id).attached_policies().is_empty());
    }

    #[test]
    fn test_identity_gets_read_only_grant() {
        let (mut app, storage) = app_with_storage();
        let delivery = DeliveryStack::build(
            &mut app,
            "cloudFrontStack",
            &storage.bucket_name,
            DeliveryStackProps::default(),
        )
        .unwrap();

        assert_eq!(delivery.grant.profile(), ActionProfile::ReadOnly);
        let rendered = app.stack(delivery.id).rendered_resources().unwrap();
        let policy = rendered
            .iter()
            .find(|r| r.kind() == ResourceKind::BucketPolicy)
            .unwrap();
        assert_eq!(policy.logical_name().as_str(), "OriginBucketPolicy");
        assert_eq!(policy.removal_policy(), RemovalPolicy::Destroy);
    }

    #[test]
    fn test_output_is_https_url() {
        let (mut app, storage) = app_with_storage();
        let delivery = DeliveryStack::build(
            &mut app,
            "cloudFrontStack",
            &storage.bucket_name,
            DeliveryStackProps::default(),
        )
        .unwrap();

        let output = app
            .stack(delivery.id)
            .outputs()
            .iter()
            .find(|(name, _)| name.as_str() == DOMAIN_OUTPUT)
            .map(|(_, value)| value.clone())
            .unwrap();
        assert_eq!(
            output,
            Value::join(vec![
                Value::from("https://"),
                delivery.distribution.domain_name()
            ])
        );
    }

    #[test]
    fn test_invalid_ttl_leaves_app_unchanged() {
        let (mut app, storage) = app_with_storage();
        let mut props = DeliveryStackProps::default();
        props.cache_policy = serde_json::from_value(serde_json::json!({
            "ttl": {
                "min": { "secs": 100, "nanos": 0 },
                "default": { "secs": 50, "nanos": 0 },
                "max": { "secs": 200, "nanos": 0 }
            },
            "cache_key": [],
            "enable_accept_encoding_gzip": true,
            "enable_accept_encoding_brotli": true,
            "comment": null
        }))
        .unwrap();
        assert_eq!(props.cache_policy.ttl(), TtlBounds::from_secs(100, 50, 200));

        let err = DeliveryStack::build(&mut app, "cloudFrontStack", &storage.bucket_name, props)
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidTtlBounds { .. }));
        assert_eq!(app.len(), 1);
    }

    #[test]
    fn test_unknown_source_stack() {
        let (mut app, storage) = app_with_storage();
        let mut dangling = storage.bucket_name.clone();
        dangling.stack = crate::core::validation::StackName::new("elsewhere").unwrap();
        let err = DeliveryStack::build(
            &mut app,
            "cloudFrontStack",
            &dangling,
            DeliveryStackProps::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StackError::UnknownStack(_)));
    }

    #[test]
    fn test_failed_import_can_be_retried() {
        let mut app = App::new();
        let storage_props = StorageStackProps {
            stack: StackProps {
                region: Some("eu-west-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let storage = StorageStack::build(&mut app, "s3BucketStack", storage_props).unwrap();

        let strict = DeliveryStackProps {
            stack: StackProps {
                region: Some("us-east-1".to_string()),
                cross_region_references: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = DeliveryStack::build(&mut app, "cloudFrontStack", &storage.bucket_name, strict)
            .unwrap_err();
        assert!(matches!(err, StackError::CrossRegionReferencesDisabled { .. }));
        assert_eq!(app.len(), 1);
        assert!(app.stack_id("cloudFrontStack").is_none());

        let relaxed = DeliveryStackProps {
            stack: StackProps {
                region: Some("us-east-1".to_string()),
                cross_region_references: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let delivery =
            DeliveryStack::build(&mut app, "cloudFrontStack", &storage.bucket_name, relaxed)
                .unwrap();
        assert_eq!(app.len(), 2);
        assert_eq!(app.stack(delivery.id).imports().len(), 1);
    }
}
