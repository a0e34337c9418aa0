//! Access policy synthesis
//!
//! Turns "principal P needs read access to bucket B" into a policy statement scoped
//! to exactly that bucket and its objects, and attaches it to the bucket's resource
//! policy. Grants are additive and keyed by (principal, resource, profile), so
//! granting the same access twice leaves a single statement.

use super::policy::{Action, Effect, Principal, Statement};
use crate::core::resource::ResourceHandle;
use crate::core::stack::Stack;
use crate::core::validation::LogicalName;
use crate::core::value::Value;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Access pattern a grant is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionProfile {
    /// Read objects and list the bucket
    ReadOnly,
    /// ReadOnly plus writing, deleting and reading object versions
    ReadWrite,
}

impl ActionProfile {
    /// The fixed, explicit action set of this profile
    pub fn actions(&self) -> BTreeSet<Action> {
        let mut actions: BTreeSet<Action> = [Action::GetObject, Action::ListBucket].into();
        if *self == ActionProfile::ReadWrite {
            actions.extend([
                Action::PutObject,
                Action::DeleteObject,
                Action::GetObjectVersion,
            ]);
        }
        actions
    }

    fn sid_prefix(&self) -> &'static str {
        match self {
            ActionProfile::ReadOnly => "AllowRead",
            ActionProfile::ReadWrite => "AllowReadWrite",
        }
    }
}

/// Identity of a grant for de-duplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantKey {
    pub principal: Principal,
    pub resource: LogicalName,
    pub profile: ActionProfile,
}

/// A minimum-privilege permission attached to the resource it protects
#[derive(Debug, Clone)]
pub struct AccessGrant {
    principal: Principal,
    resource: ResourceHandle,
    profile: ActionProfile,
    statement: Statement,
}

impl AccessGrant {
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn resource(&self) -> &ResourceHandle {
        &self.resource
    }

    pub fn profile(&self) -> ActionProfile {
        self.profile
    }

    pub fn actions(&self) -> &BTreeSet<Action> {
        &self.statement.actions
    }

    /// Statement this grant contributed to the resource policy
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn key(&self) -> GrantKey {
        GrantKey {
            principal: self.principal.clone(),
            resource: self.resource.logical_name.clone(),
            profile: self.profile,
        }
    }
}

/// Builds scoped statements and attaches them to bucket policies
pub struct AccessPolicySynthesizer;

impl AccessPolicySynthesizer {
    /// Grant `principal` the `profile` actions on `resource`
    ///
    /// `resource` must be a bucket (created or imported) declared in `stack`. The
    /// statement is appended to the bucket's attached policy; an identical earlier
    /// grant is returned unchanged instead of adding a second statement.
    pub fn grant_access(
        stack: &mut Stack,
        principal: Principal,
        resource: &ResourceHandle,
        profile: ActionProfile,
    ) -> Result<AccessGrant> {
        let key = GrantKey {
            principal: principal.clone(),
            resource: resource.logical_name.clone(),
            profile,
        };

        let stack_name = stack.name().clone();
        let policy = stack.attached_policy_mut(resource)?;

        if let Some(existing) = policy.grants().iter().find(|g| g.key() == key) {
            debug!(
                "Grant {:?} on '{}' already present in stack '{}'",
                profile, resource.logical_name, stack_name
            );
            return Ok(existing.clone());
        }

        let sid = format!("{}{}", profile.sid_prefix(), policy.grants().len() + 1);
        let statement = Self::identity_statement(resource, profile)
            .with_sid(sid)
            .with_principal(principal.clone());

        let grant = AccessGrant {
            principal,
            resource: resource.clone(),
            profile,
            statement,
        };
        policy.add_grant(grant.clone());

        debug!(
            "Granted {:?} on '{}' in stack '{}'",
            profile, resource.logical_name, stack_name
        );
        Ok(grant)
    }

    /// Statement allowing `profile` on the bucket and its objects, with no principal
    ///
    /// Used directly for identity-based policies attached to roles and groups.
    pub fn identity_statement(resource: &ResourceHandle, profile: ActionProfile) -> Statement {
        Statement::new(Effect::Allow, profile.actions(), Self::scoped_resources(resource))
    }

    /// `[bucket-arn, bucket-arn/*]`, never anything broader
    fn scoped_resources(resource: &ResourceHandle) -> Vec<Value> {
        vec![resource.arn(), resource.arn_for_objects("*")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::{ResourceDescriptor, ResourceKind};
    use crate::core::stack::StackProps;
    use crate::core::validation::StackName;
    use crate::core::value::Attribute;
    use crate::error::StackError;

    fn delivery_stack() -> (Stack, ResourceHandle, ResourceHandle) {
        let mut stack = Stack::new(StackName::new("delivery").unwrap(), StackProps::default());
        let bucket = stack
            .declare(ResourceDescriptor::new(ResourceKind::Bucket, "OriginBucket").unwrap())
            .unwrap();
        let oai = stack
            .declare(
                ResourceDescriptor::new(ResourceKind::OriginAccessIdentity, "DistributionOAI")
                    .unwrap(),
            )
            .unwrap();
        (stack, bucket, oai)
    }

    fn oai_principal(oai: &ResourceHandle) -> Principal {
        Principal::CanonicalUser(oai.attr(Attribute::CanonicalUserId))
    }

    #[test]
    fn test_profiles_are_explicit() {
        assert_eq!(
            ActionProfile::ReadOnly.actions(),
            BTreeSet::from([Action::GetObject, Action::ListBucket])
        );

        let read_write = ActionProfile::ReadWrite.actions();
        assert_eq!(read_write.len(), 5);
        assert!(ActionProfile::ReadOnly.actions().is_subset(&read_write));
        assert!(read_write.contains(&Action::GetObjectVersion));
    }

    #[test]
    fn test_grant_is_scoped_to_bucket_and_objects() {
        let (mut stack, bucket, oai) = delivery_stack();
        let grant = AccessPolicySynthesizer::grant_access(
            &mut stack,
            oai_principal(&oai),
            &bucket,
            ActionProfile::ReadOnly,
        )
        .unwrap();

        assert_eq!(
            grant.statement().resources,
            vec![bucket.arn(), bucket.arn_for_objects("*")]
        );
        assert_eq!(grant.actions(), &ActionProfile::ReadOnly.actions());
    }

    #[test]
    fn test_grant_twice_yields_one_statement() {
        let (mut stack, bucket, oai) = delivery_stack();
        for _ in 0..2 {
            AccessPolicySynthesizer::grant_access(
                &mut stack,
                oai_principal(&oai),
                &bucket,
                ActionProfile::ReadOnly,
            )
            .unwrap();
        }

        let policy = stack.attached_policy(&bucket.logical_name).unwrap();
        assert_eq!(policy.document().len(), 1);
        assert_eq!(policy.grants().len(), 1);
    }

    #[test]
    fn test_grants_are_additive() {
        let (mut stack, bucket, oai) = delivery_stack();
        AccessPolicySynthesizer::grant_access(
            &mut stack,
            oai_principal(&oai),
            &bucket,
            ActionProfile::ReadOnly,
        )
        .unwrap();
        AccessPolicySynthesizer::grant_access(
            &mut stack,
            Principal::Service("s3.amazonaws.com".to_string()),
            &bucket,
            ActionProfile::ReadWrite,
        )
        .unwrap();

        let policy = stack.attached_policy(&bucket.logical_name).unwrap();
        assert_eq!(policy.document().len(), 2);
        assert_eq!(
            policy.document().statements[0].sid.as_deref(),
            Some("AllowRead1")
        );
        assert_eq!(
            policy.document().statements[1].sid.as_deref(),
            Some("AllowReadWrite2")
        );
    }

    #[test]
    fn test_grant_on_non_bucket_rejected() {
        let (mut stack, _, oai) = delivery_stack();
        let err = AccessPolicySynthesizer::grant_access(
            &mut stack,
            oai_principal(&oai),
            &oai,
            ActionProfile::ReadOnly,
        )
        .unwrap_err();
        assert!(matches!(err, StackError::UnsupportedGrantTarget { .. }));
    }

    #[test]
    fn test_policy_name_is_reserved() {
        let (mut stack, bucket, oai) = delivery_stack();
        AccessPolicySynthesizer::grant_access(
            &mut stack,
            oai_principal(&oai),
            &bucket,
            ActionProfile::ReadOnly,
        )
        .unwrap();

        let clash = ResourceDescriptor::new(ResourceKind::Role, "OriginBucketPolicy").unwrap();
        assert!(matches!(
            stack.declare(clash),
            Err(StackError::DuplicateLogicalName { .. })
        ));

        let rendered = stack.rendered_resources().unwrap();
        let last = rendered.last().unwrap();
        assert_eq!(last.kind(), ResourceKind::BucketPolicy);
        assert_eq!(last.logical_name().as_str(), "OriginBucketPolicy");
    }
}
