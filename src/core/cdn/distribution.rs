//! Distribution configuration
//!
//! Edge functions, custom error pages and the web ACL are optional and empty by
//! default. A distribution with none of them serves the origin bucket over HTTPS with
//! `index.html` as its root object.

use crate::core::resource::{ResourceDescriptor, ResourceHandle, ResourceKind};
use crate::core::validation::LogicalName;
use crate::core::value::Value;
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How viewers may reach the distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewerProtocolPolicy {
    AllowAll,
    HttpsOnly,
    #[default]
    RedirectToHttps,
}

impl ViewerProtocolPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerProtocolPolicy::AllowAll => "allow-all",
            ViewerProtocolPolicy::HttpsOnly => "https-only",
            ViewerProtocolPolicy::RedirectToHttps => "redirect-to-https",
        }
    }
}

/// Request/response phase an edge function runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeEventType {
    ViewerRequest,
    OriginRequest,
    OriginResponse,
    ViewerResponse,
}

impl EdgeEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeEventType::ViewerRequest => "viewer-request",
            EdgeEventType::OriginRequest => "origin-request",
            EdgeEventType::OriginResponse => "origin-response",
            EdgeEventType::ViewerResponse => "viewer-response",
        }
    }
}

/// Function version invoked at the edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFunction {
    pub event_type: EdgeEventType,
    /// Qualified ARN of the function version
    pub function_arn: String,
    #[serde(default)]
    pub include_body: bool,
}

/// Custom page served for an origin error status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub http_status: u16,
    pub response_http_status: Option<u16>,
    /// Absolute path of the page inside the origin bucket, e.g. `/errors/404.html`
    pub response_page_path: Option<String>,
    /// Seconds the error response is cached
    pub ttl_secs: Option<u64>,
}

/// Resources the default cache behaviour is wired to
#[derive(Debug, Clone)]
pub struct DistributionOrigin {
    pub bucket: ResourceHandle,
    pub access_identity: ResourceHandle,
    pub cache_policy: ResourceHandle,
    pub origin_request_policy: ResourceHandle,
}

impl DistributionOrigin {
    fn validate(&self) -> Result<()> {
        let expected = [
            (&self.bucket, "origin bucket", self.bucket.kind.is_bucket()),
            (
                &self.access_identity,
                "origin access identity",
                self.access_identity.kind == ResourceKind::OriginAccessIdentity,
            ),
            (
                &self.cache_policy,
                "cache policy",
                self.cache_policy.kind == ResourceKind::CachePolicy,
            ),
            (
                &self.origin_request_policy,
                "origin request policy",
                self.origin_request_policy.kind == ResourceKind::OriginRequestPolicy,
            ),
        ];

        for (handle, role, ok) in expected {
            if !ok {
                return Err(StackError::InvalidDistribution(format!(
                    "'{}' is a {} and cannot be used as the {}",
                    handle.logical_name, handle.kind, role
                )));
            }
        }
        Ok(())
    }
}

/// Distribution settings independent of the origin wiring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub default_root_object: String,
    pub error_responses: Vec<ErrorResponse>,
    pub edge_functions: Vec<EdgeFunction>,
    pub web_acl_id: Option<String>,
    pub comment: Option<String>,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        DistributionConfig {
            viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
            default_root_object: "index.html".to_string(),
            error_responses: Vec::new(),
            edge_functions: Vec::new(),
            web_acl_id: None,
            comment: None,
        }
    }
}

impl DistributionConfig {
    /// Associate a web ACL; an empty id clears the association
    pub fn with_web_acl(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.web_acl_id = if id.trim().is_empty() { None } else { Some(id) };
        self
    }

    pub fn with_error_response(mut self, response: ErrorResponse) -> Self {
        self.error_responses.push(response);
        self
    }

    pub fn with_edge_function(mut self, function: EdgeFunction) -> Self {
        self.edge_functions.push(function);
        self
    }

    /// Web ACL id, treating an empty string as no association
    pub fn web_acl(&self) -> Option<&str> {
        self.web_acl_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_root_object.starts_with('/') {
            return Err(StackError::InvalidDistribution(format!(
                "default root object '{}' must not start with '/'",
                self.default_root_object
            )));
        }

        let mut statuses = HashSet::new();
        for response in &self.error_responses {
            if !(400..=599).contains(&response.http_status) {
                return Err(StackError::InvalidDistribution(format!(
                    "error response for status {} is not an error status",
                    response.http_status
                )));
            }
            if !statuses.insert(response.http_status) {
                return Err(StackError::InvalidDistribution(format!(
                    "duplicate error response for status {}",
                    response.http_status
                )));
            }
            if let Some(path) = &response.response_page_path {
                if !path.starts_with('/') {
                    return Err(StackError::InvalidDistribution(format!(
                        "error page path '{}' must start with '/'",
                        path
                    )));
                }
                if response.response_http_status.is_none() {
                    return Err(StackError::InvalidDistribution(format!(
                        "error page for status {} needs a response status",
                        response.http_status
                    )));
                }
            }
        }

        let mut events = HashSet::new();
        for function in &self.edge_functions {
            if function.function_arn.trim().is_empty() {
                return Err(StackError::InvalidDistribution(format!(
                    "edge function for {} has no ARN",
                    function.event_type.as_str()
                )));
            }
            if !events.insert(function.event_type) {
                return Err(StackError::InvalidDistribution(format!(
                    "more than one edge function for {}",
                    function.event_type.as_str()
                )));
            }
            if function.include_body
                && !matches!(
                    function.event_type,
                    EdgeEventType::ViewerRequest | EdgeEventType::OriginRequest
                )
            {
                return Err(StackError::InvalidDistribution(format!(
                    "request body is not available to {} functions",
                    function.event_type.as_str()
                )));
            }
        }

        Ok(())
    }

    /// Render the distribution resource
    pub fn to_descriptor<N>(&self, logical_name: N, origin: &DistributionOrigin) -> Result<ResourceDescriptor>
    where
        N: TryInto<LogicalName, Error = StackError>,
    {
        self.validate()?;
        origin.validate()?;

        let associations = self.edge_functions.iter().map(|f| {
            Value::map([
                ("EventType", Value::from(f.event_type.as_str())),
                ("LambdaFunctionARN", Value::from(f.function_arn.clone())),
                ("IncludeBody", Value::from(f.include_body)),
            ])
        });

        let default_behavior = Value::map([
            ("TargetOriginId", Value::from(origin.bucket.logical_name.as_str())),
            (
                "ViewerProtocolPolicy",
                Value::from(self.viewer_protocol_policy.as_str()),
            ),
            ("CachePolicyId", origin.cache_policy.id()),
            ("OriginRequestPolicyId", origin.origin_request_policy.id()),
            ("LambdaFunctionAssociations", Value::list(associations)),
        ]);

        let s3_origin = Value::map([
            ("Id", Value::from(origin.bucket.logical_name.as_str())),
            ("DomainName", origin.bucket.domain_name()),
            (
                "OriginAccessIdentity",
                Value::join(vec![
                    Value::from("origin-access-identity/cloudfront/"),
                    origin.access_identity.id(),
                ]),
            ),
        ]);

        let error_responses = self.error_responses.iter().map(|r| {
            Value::map([
                ("ErrorCode", Value::from(u32::from(r.http_status))),
                (
                    "ResponseCode",
                    Value::from(r.response_http_status.map(u32::from)),
                ),
                ("ResponsePagePath", Value::from(r.response_page_path.clone())),
                (
                    "ErrorCachingMinTTL",
                    Value::from(r.ttl_secs.map(|secs| secs as i64)),
                ),
            ])
        });

        Ok(ResourceDescriptor::new(ResourceKind::Distribution, logical_name)?
            .with("Enabled", true)
            .with_optional("Comment", self.comment.clone())
            .with("DefaultRootObject", self.default_root_object.clone())
            .with("Origins", Value::list([s3_origin]))
            .with("DefaultCacheBehavior", default_behavior)
            .with("CustomErrorResponses", Value::list(error_responses))
            .with_optional("WebACLId", self.web_acl().map(str::to_string)))
    }
}
