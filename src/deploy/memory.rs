//! In-memory provisioning backend
//!
//! Provisions resources into a process-local model of the provider: buckets with
//! objects and resource policies, identities, cache policies and distributions.
//! Physical ids are derived from the stack and logical name, so applying the same app
//! twice yields the same names. Used by the test suite and for local dry runs.

use super::backend::{
    ApplyFailure, DeploymentResult, DeploymentStatus, ProvisioningBackend, ResolvedStack,
    TeardownReport,
};
use crate::core::iam::{Action, ResolvedPolicy, ResolvedPrincipal};
use crate::core::reference::CrossStackReference;
use crate::core::resource::{RemovalPolicy, ResourceKind};
use crate::core::validation::{ExportName, LogicalName, StackName};
use crate::core::value::{Attribute, AttributeRef, TokenResolver};
use crate::error::StackError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Account id used in generated ARNs
pub const ACCOUNT_ID: &str = "000000000000";

/// Suffix of every distribution domain
pub const DISTRIBUTION_DOMAIN_SUFFIX: &str = ".cloudfront.net";

const BUCKET_DOMAIN_SUFFIX: &str = ".s3.amazonaws.com";
const OAI_PATH_PREFIX: &str = "origin-access-identity/cloudfront/";

/// Errors of the in-memory provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("No such bucket: {0}")]
    NoSuchBucket(String),

    #[error("No such key: {0}")]
    NoSuchKey(String),

    #[error("No such distribution: {0}")]
    NoSuchDistribution(String),

    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("Bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Missing property '{property}' on {kind}")]
    MissingProperty { kind: ResourceKind, property: String },

    #[error("Malformed policy document: {0}")]
    MalformedPolicy(String),

    #[error("Injected failure")]
    Injected,
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Validate a bucket name against the provider's naming rules
///
/// 3-63 characters of lowercase letters, digits, dots and hyphens, starting and
/// ending with a letter or digit, without consecutive dots.
pub fn validate_bucket_name(name: &str) -> BackendResult<()> {
    if name.len() < 3 || name.len() > 63 {
        return Err(BackendError::InvalidBucketName(format!(
            "'{}' must be 3-63 characters, got {}",
            name,
            name.len()
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(BackendError::InvalidBucketName(format!(
            "'{}' must contain only lowercase letters, numbers, dots, and hyphens",
            name
        )));
    }

    let starts_ok = name.starts_with(|c: char| c.is_ascii_alphanumeric());
    let ends_ok = name.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !(starts_ok && ends_ok) {
        return Err(BackendError::InvalidBucketName(format!(
            "'{}' must start and end with letter or number",
            name
        )));
    }

    if name.contains("..") {
        return Err(BackendError::InvalidBucketName(format!(
            "'{}' cannot contain consecutive dots",
            name
        )));
    }

    Ok(())
}

/// Object keys are any UTF-8 string up to 1024 bytes
pub fn validate_key(key: &str) -> BackendResult<()> {
    if key.is_empty() {
        return Err(BackendError::InvalidKey("Key cannot be empty".to_string()));
    }

    if key.len() > 1024 {
        return Err(BackendError::InvalidKey(format!(
            "Key too long: {} bytes (max 1024)",
            key.len()
        )));
    }

    Ok(())
}

/// Hex-encoded SHA-256 of the given parts, separated by '/'
fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("/").as_bytes());
    hex::encode(hasher.finalize())
}

/// ETag of object content
fn etag(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[derive(Debug, Clone)]
struct Bucket {
    objects: BTreeMap<String, Vec<u8>>,
    policy: Option<ResolvedPolicy>,
    /// Stack and logical name that created the bucket; `None` for pre-existing ones
    owner: Option<(StackName, LogicalName)>,
}

#[derive(Debug, Clone)]
struct Provisioned {
    logical_name: LogicalName,
    kind: ResourceKind,
    physical_id: String,
    removal_policy: RemovalPolicy,
    attributes: BTreeMap<Attribute, String>,
    properties: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, Bucket>,
    /// Provisioned resources per stack, in creation order
    stacks: HashMap<StackName, Vec<Provisioned>>,
    failures: HashSet<(String, String)>,
}

impl State {
    fn distribution_by_domain(&self, domain: &str) -> Option<&Provisioned> {
        self.stacks.values().flatten().find(|r| {
            r.kind == ResourceKind::Distribution
                && r.attributes.get(&Attribute::DomainName).map(String::as_str) == Some(domain)
        })
    }

    fn identity_by_id(&self, id: &str) -> Option<&Provisioned> {
        self.stacks.values().flatten().find(|r| {
            r.kind == ResourceKind::OriginAccessIdentity
                && r.attributes.get(&Attribute::Id).map(String::as_str) == Some(id)
        })
    }
}

/// Attribute lookup over the resources provisioned so far in one stack
struct Attributes<'a> {
    stack: &'a StackName,
    resources: &'a [Provisioned],
}

impl TokenResolver for Attributes<'_> {
    fn attribute(&self, attr: &AttributeRef) -> Option<String> {
        self.resources
            .iter()
            .find(|r| r.logical_name == attr.resource)
            .and_then(|r| r.attributes.get(&attr.attribute).cloned())
    }

    fn import(&self, reference: &CrossStackReference) -> crate::error::Result<String> {
        // Imports are substituted before a stack reaches the backend
        Err(StackError::UnresolvedExportAccess {
            stack: reference.source_stack.to_string(),
            export: format!("{} (seen by '{}')", reference.export_name, self.stack),
        })
    }
}

/// Process-local provider
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        info!("Initializing in-memory provisioning backend");
        Self::default()
    }

    /// Make the next applies of `logical_name` in `stack` fail
    pub fn fail_resource(&self, stack: &str, logical_name: &str) {
        self.state
            .lock()
            .failures
            .insert((stack.to_string(), logical_name.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Create a bucket outside of any stack
    pub fn create_bucket(&self, name: &str) -> BackendResult<()> {
        validate_bucket_name(name)?;
        let mut state = self.state.lock();
        if state.buckets.contains_key(name) {
            return Err(BackendError::BucketAlreadyExists(name.to_string()));
        }
        state.buckets.insert(
            name.to_string(),
            Bucket {
                objects: BTreeMap::new(),
                policy: None,
                owner: None,
            },
        );
        debug!("Created unmanaged bucket '{}'", name);
        Ok(())
    }

    pub fn bucket_exists(&self, name: &str) -> bool {
        self.state.lock().buckets.contains_key(name)
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.state.lock().buckets.keys().cloned().collect()
    }

    /// Store an object, returning its ETag
    pub fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> BackendResult<String> {
        validate_key(key)?;
        let mut state = self.state.lock();
        let target = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| BackendError::NoSuchBucket(bucket.to_string()))?;
        target.objects.insert(key.to_string(), data.to_vec());
        Ok(etag(data))
    }

    pub fn get_object(&self, bucket: &str, key: &str) -> BackendResult<Vec<u8>> {
        validate_key(key)?;
        let state = self.state.lock();
        let source = state
            .buckets
            .get(bucket)
            .ok_or_else(|| BackendError::NoSuchBucket(bucket.to_string()))?;
        source
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::NoSuchKey(format!("{}/{}", bucket, key)))
    }

    pub fn object_count(&self, bucket: &str) -> Option<usize> {
        self.state.lock().buckets.get(bucket).map(|b| b.objects.len())
    }

    /// Resource policy currently attached to a bucket
    pub fn bucket_policy(&self, bucket: &str) -> Option<ResolvedPolicy> {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.policy.clone())
    }

    /// Evaluate the bucket's resource policy for an object or bucket-level action
    ///
    /// `key` of `None` addresses the bucket itself.
    pub fn is_allowed(
        &self,
        bucket: &str,
        principal: &ResolvedPrincipal,
        action: Action,
        key: Option<&str>,
    ) -> bool {
        let arn = match key {
            Some(key) => format!("arn:aws:s3:::{}/{}", bucket, key),
            None => format!("arn:aws:s3:::{}", bucket),
        };
        self.bucket_policy(bucket)
            .map(|policy| policy.is_allowed(principal, action, &arn))
            .unwrap_or(false)
    }

    /// Physical id of a provisioned resource
    pub fn physical_id(&self, stack: &str, logical_name: &str) -> Option<String> {
        self.resource_attribute(stack, logical_name, None)
    }

    /// One attribute of a provisioned resource
    pub fn attribute(&self, stack: &str, logical_name: &str, attribute: Attribute) -> Option<String> {
        self.resource_attribute(stack, logical_name, Some(attribute))
    }

    fn resource_attribute(
        &self,
        stack: &str,
        logical_name: &str,
        attribute: Option<Attribute>,
    ) -> Option<String> {
        let state = self.state.lock();
        let resources = state
            .stacks
            .iter()
            .find(|(name, _)| name.as_str() == stack)
            .map(|(_, resources)| resources)?;
        let resource = resources
            .iter()
            .find(|r| r.logical_name.as_str() == logical_name)?;
        match attribute {
            Some(attribute) => resource.attributes.get(&attribute).cloned(),
            None => Some(resource.physical_id.clone()),
        }
    }

    /// Serve a path through a distribution the way an edge location would
    ///
    /// The distribution reads its origin as its origin-access identity, so the fetch
    /// only succeeds if the bucket policy lets that identity read the object. An empty
    /// path serves the default root object.
    pub fn fetch(&self, url: &str, path: &str) -> BackendResult<Vec<u8>> {
        let domain = url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');

        let (bucket, canonical_user, key) = {
            let state = self.state.lock();
            let distribution = state
                .distribution_by_domain(domain)
                .ok_or_else(|| BackendError::NoSuchDistribution(domain.to_string()))?;

            let origin = distribution
                .properties
                .get("Origins")
                .and_then(|o| o.get(0))
                .ok_or_else(|| BackendError::MissingProperty {
                    kind: ResourceKind::Distribution,
                    property: "Origins".to_string(),
                })?;
            let bucket = origin
                .get("DomainName")
                .and_then(|d| d.as_str())
                .and_then(|d| d.strip_suffix(BUCKET_DOMAIN_SUFFIX))
                .ok_or_else(|| BackendError::MissingProperty {
                    kind: ResourceKind::Distribution,
                    property: "Origins.DomainName".to_string(),
                })?
                .to_string();
            let identity_id = origin
                .get("OriginAccessIdentity")
                .and_then(|d| d.as_str())
                .and_then(|d| d.strip_prefix(OAI_PATH_PREFIX))
                .ok_or_else(|| BackendError::MissingProperty {
                    kind: ResourceKind::Distribution,
                    property: "Origins.OriginAccessIdentity".to_string(),
                })?;
            let canonical_user = state
                .identity_by_id(identity_id)
                .and_then(|i| i.attributes.get(&Attribute::CanonicalUserId).cloned())
                .ok_or_else(|| BackendError::AccessDenied(identity_id.to_string()))?;

            let path = path.trim_start_matches('/');
            let key = if path.is_empty() {
                distribution
                    .properties
                    .get("DefaultRootObject")
                    .and_then(|r| r.as_str())
                    .unwrap_or("index.html")
                    .to_string()
            } else {
                path.to_string()
            };
            (bucket, canonical_user, key)
        };

        let principal = ResolvedPrincipal::CanonicalUser(canonical_user);
        if !self.is_allowed(&bucket, &principal, Action::GetObject, Some(&key)) {
            return Err(BackendError::AccessDenied(format!("{}/{}", bucket, key)));
        }
        self.get_object(&bucket, &key)
    }

    fn apply_stack(&self, stack: &ResolvedStack) -> Result<DeploymentResult, ApplyFailure> {
        let mut state = self.state.lock();
        let status = if state.stacks.contains_key(&stack.name) {
            DeploymentStatus::Updated
        } else {
            DeploymentStatus::Created
        };

        let mut provisioned: Vec<Provisioned> = Vec::new();
        let mut completed: Vec<String> = Vec::new();

        let outcome = provision_all(&mut state, stack, &mut provisioned, &mut completed)
            .and_then(|()| resolve_outputs(stack, &provisioned, &completed));
        let (exported_values, outputs) = match outcome {
            Ok(resolved) => resolved,
            Err(failure) => {
                // Whatever was created stays tracked so teardown can find it
                if !provisioned.is_empty() {
                    warn!(
                        "Stack '{}' left partially provisioned ({} resources)",
                        stack.name,
                        provisioned.len()
                    );
                    merge_provisioned(&mut state, &stack.name, provisioned);
                }
                return Err(failure);
            }
        };

        let physical_ids = provisioned
            .iter()
            .map(|r| (r.logical_name.clone(), r.physical_id.clone()))
            .collect();

        state.stacks.insert(stack.name.clone(), provisioned);
        info!("Stack '{}' provisioned ({:?})", stack.name, status);

        Ok(DeploymentResult {
            stack: stack.name.clone(),
            status,
            exported_values,
            outputs,
            physical_ids,
            completed_at: Utc::now(),
        })
    }

    fn destroy_stack(&self, stack: &ResolvedStack) -> Result<TeardownReport, ApplyFailure> {
        let mut state = self.state.lock();
        let mut report = TeardownReport {
            stack: stack.name.to_string(),
            ..Default::default()
        };

        let Some(mut resources) = state.stacks.remove(&stack.name) else {
            return Ok(report);
        };

        while let Some(resource) = resources.pop() {
            let name = resource.logical_name.to_string();
            if let Err(e) = release(&mut state, &resource, &mut report) {
                // Keep what is left so a later teardown can retry
                resources.push(resource);
                state.stacks.insert(stack.name.clone(), resources);
                return Err(ApplyFailure {
                    resource: Some(name),
                    completed: report.deleted.clone(),
                    reason: e.to_string(),
                });
            }
        }

        info!(
            "Stack '{}' destroyed ({} deleted, {} retained)",
            stack.name,
            report.deleted.len(),
            report.retained.len()
        );
        Ok(report)
    }
}

#[async_trait]
impl ProvisioningBackend for InMemoryBackend {
    async fn apply(&self, stack: &ResolvedStack) -> Result<DeploymentResult, ApplyFailure> {
        self.apply_stack(stack)
    }

    async fn destroy(&self, stack: &ResolvedStack) -> Result<TeardownReport, ApplyFailure> {
        self.destroy_stack(stack)
    }
}

/// Create every resource of `stack` in declaration order
fn provision_all(
    state: &mut State,
    stack: &ResolvedStack,
    provisioned: &mut Vec<Provisioned>,
    completed: &mut Vec<String>,
) -> Result<(), ApplyFailure> {
    for descriptor in &stack.resources {
        let logical_name = descriptor.logical_name();
        let fail = |reason: String| ApplyFailure::at(logical_name, completed.as_slice(), reason);

        if state
            .failures
            .contains(&(stack.name.to_string(), logical_name.to_string()))
        {
            warn!("Injected failure at '{}' in stack '{}'", logical_name, stack.name);
            return Err(fail(BackendError::Injected.to_string()));
        }

        let resolver = Attributes {
            stack: &stack.name,
            resources: provisioned.as_slice(),
        };
        let mut properties = serde_json::Map::new();
        for (key, value) in descriptor.configuration() {
            let resolved = value.resolve(&resolver).map_err(|e| fail(e.to_string()))?;
            properties.insert(key.clone(), resolved);
        }

        let id = digest(&[stack.name.as_str(), logical_name.as_str()]);
        let attributes =
            provision(state, &stack.name, logical_name, descriptor.kind(), &properties, &id)
                .map_err(|e| fail(e.to_string()))?;

        debug!(
            "Provisioned {} '{}' in stack '{}'",
            descriptor.kind(),
            logical_name,
            stack.name
        );
        provisioned.push(Provisioned {
            logical_name: logical_name.clone(),
            kind: descriptor.kind(),
            physical_id: attributes
                .get(&Attribute::Id)
                .cloned()
                .unwrap_or_else(|| id.clone()),
            removal_policy: descriptor.removal_policy(),
            attributes,
            properties,
        });
        completed.push(logical_name.to_string());
    }
    Ok(())
}

type ResolvedOutputs = (BTreeMap<ExportName, String>, BTreeMap<LogicalName, String>);

/// Real values of the stack's exports and outputs
fn resolve_outputs(
    stack: &ResolvedStack,
    provisioned: &[Provisioned],
    completed: &[String],
) -> Result<ResolvedOutputs, ApplyFailure> {
    let resolver = Attributes {
        stack: &stack.name,
        resources: provisioned,
    };
    let fail = |e: StackError| ApplyFailure {
        resource: None,
        completed: completed.to_vec(),
        reason: e.to_string(),
    };

    let exported_values = stack
        .exports
        .iter()
        .map(|(name, value)| value.resolve_string(&resolver).map(|v| (name.clone(), v)))
        .collect::<crate::error::Result<_>>()
        .map_err(fail)?;
    let outputs = stack
        .outputs
        .iter()
        .map(|(name, value)| value.resolve_string(&resolver).map(|v| (name.clone(), v)))
        .collect::<crate::error::Result<_>>()
        .map_err(fail)?;
    Ok((exported_values, outputs))
}

/// Record resources created by a failed apply next to those already tracked
fn merge_provisioned(state: &mut State, stack: &StackName, provisioned: Vec<Provisioned>) {
    let tracked = state.stacks.entry(stack.clone()).or_default();
    for resource in provisioned {
        match tracked
            .iter_mut()
            .find(|r| r.logical_name == resource.logical_name)
        {
            Some(existing) => *existing = resource,
            None => tracked.push(resource),
        }
    }
}

fn string_property<'a>(
    properties: &'a serde_json::Map<String, serde_json::Value>,
    kind: ResourceKind,
    property: &str,
) -> BackendResult<&'a str> {
    properties
        .get(property)
        .and_then(|v| v.as_str())
        .ok_or_else(|| BackendError::MissingProperty {
            kind,
            property: property.to_string(),
        })
}

fn optional_name(
    properties: &serde_json::Map<String, serde_json::Value>,
    property: &str,
    fallback: impl FnOnce() -> String,
) -> String {
    properties
        .get(property)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(fallback)
}

fn bucket_attributes(name: &str) -> BTreeMap<Attribute, String> {
    BTreeMap::from([
        (Attribute::Name, name.to_string()),
        (Attribute::Id, name.to_string()),
        (Attribute::Arn, format!("arn:aws:s3:::{}", name)),
        (
            Attribute::DomainName,
            format!("{}{}", name, BUCKET_DOMAIN_SUFFIX),
        ),
    ])
}

fn iam_attributes(kind: &str, name: &str) -> BTreeMap<Attribute, String> {
    BTreeMap::from([
        (Attribute::Name, name.to_string()),
        (Attribute::Id, name.to_string()),
        (
            Attribute::Arn,
            format!("arn:aws:iam::{}:{}/{}", ACCOUNT_ID, kind, name),
        ),
    ])
}

fn parse_policy(value: Option<&serde_json::Value>, kind: ResourceKind) -> BackendResult<ResolvedPolicy> {
    let value = value.cloned().ok_or_else(|| BackendError::MissingProperty {
        kind,
        property: "PolicyDocument".to_string(),
    })?;
    ResolvedPolicy::from_json_value(value).map_err(|e| BackendError::MalformedPolicy(e.to_string()))
}

/// Create or update one resource and return its attributes
fn provision(
    state: &mut State,
    stack: &StackName,
    logical_name: &LogicalName,
    kind: ResourceKind,
    properties: &serde_json::Map<String, serde_json::Value>,
    id: &str,
) -> BackendResult<BTreeMap<Attribute, String>> {
    match kind {
        ResourceKind::Bucket => {
            let name = optional_name(properties, "BucketName", || {
                format!(
                    "{}-{}-{}",
                    stack.as_str().to_ascii_lowercase(),
                    logical_name.as_str().to_ascii_lowercase(),
                    &id[..12]
                )
            });
            validate_bucket_name(&name)?;

            let owner = (stack.clone(), logical_name.clone());
            match state.buckets.get(&name) {
                Some(existing) if existing.owner.as_ref() != Some(&owner) => {
                    return Err(BackendError::BucketAlreadyExists(name));
                }
                Some(_) => {}
                None => {
                    state.buckets.insert(
                        name.clone(),
                        Bucket {
                            objects: BTreeMap::new(),
                            policy: None,
                            owner: Some(owner),
                        },
                    );
                }
            }
            Ok(bucket_attributes(&name))
        }

        ResourceKind::ImportedBucket => {
            let name = string_property(properties, kind, "BucketName")?;
            if !state.buckets.contains_key(name) {
                return Err(BackendError::NoSuchBucket(name.to_string()));
            }
            Ok(bucket_attributes(name))
        }

        ResourceKind::BucketPolicy => {
            let name = string_property(properties, kind, "Bucket")?;
            let policy = parse_policy(properties.get("PolicyDocument"), kind)?;
            let bucket = state
                .buckets
                .get_mut(name)
                .ok_or_else(|| BackendError::NoSuchBucket(name.to_string()))?;
            bucket.policy = Some(policy);
            Ok(BTreeMap::from([(Attribute::Id, id[..16].to_string())]))
        }

        ResourceKind::ManagedPolicy => {
            parse_policy(properties.get("PolicyDocument"), kind)?;
            let name = optional_name(properties, "ManagedPolicyName", || id[..16].to_string());
            Ok(iam_attributes("policy", &name))
        }

        ResourceKind::Role => {
            let name = optional_name(properties, "RoleName", || id[..16].to_string());
            Ok(iam_attributes("role", &name))
        }

        ResourceKind::Group => {
            let name = optional_name(properties, "GroupName", || id[..16].to_string());
            Ok(iam_attributes("group", &name))
        }

        ResourceKind::OriginAccessIdentity => {
            let identity_id = format!("E{}", id[..13].to_ascii_uppercase());
            Ok(BTreeMap::from([
                (Attribute::Id, identity_id.clone()),
                (Attribute::Name, identity_id),
                (
                    Attribute::CanonicalUserId,
                    digest(&[id, "canonical-user"]),
                ),
            ]))
        }

        ResourceKind::CachePolicy | ResourceKind::OriginRequestPolicy => {
            Ok(BTreeMap::from([(Attribute::Id, id[..32].to_string())]))
        }

        ResourceKind::Distribution => {
            let distribution_id = format!("E{}", id[..13].to_ascii_uppercase());
            Ok(BTreeMap::from([
                (Attribute::Id, distribution_id.clone()),
                (
                    Attribute::Arn,
                    format!(
                        "arn:aws:cloudfront::{}:distribution/{}",
                        ACCOUNT_ID, distribution_id
                    ),
                ),
                (
                    Attribute::DomainName,
                    format!("d{}{}", &id[..13], DISTRIBUTION_DOMAIN_SUFFIX),
                ),
            ]))
        }
    }
}

/// Delete or keep one resource on teardown
fn release(state: &mut State, resource: &Provisioned, report: &mut TeardownReport) -> BackendResult<()> {
    let name = resource.logical_name.to_string();

    if resource.kind == ResourceKind::ImportedBucket {
        report.released.push(name);
        return Ok(());
    }

    if resource.removal_policy == RemovalPolicy::Retain {
        debug!("Retaining {} '{}'", resource.kind, name);
        report.retained.push(name);
        return Ok(());
    }

    match resource.kind {
        ResourceKind::Bucket => {
            let bucket_name = resource
                .attributes
                .get(&Attribute::Name)
                .cloned()
                .unwrap_or_default();
            let auto_delete = resource
                .properties
                .get("AutoDeleteObjects")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            if let Some(bucket) = state.buckets.get_mut(&bucket_name) {
                if !bucket.objects.is_empty() {
                    if !auto_delete {
                        return Err(BackendError::BucketNotEmpty(bucket_name));
                    }
                    debug!(
                        "Emptying bucket '{}' ({} objects)",
                        bucket_name,
                        bucket.objects.len()
                    );
                    bucket.objects.clear();
                }
            }
            state.buckets.remove(&bucket_name);
        }
        ResourceKind::BucketPolicy => {
            let bucket_name = resource
                .properties
                .get("Bucket")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if let Some(bucket) = state.buckets.get_mut(bucket_name) {
                bucket.policy = None;
            }
        }
        _ => {}
    }

    report.deleted.push(name);
    Ok(())
}
