//! Deployment configuration
//!
//! A TOML document with one section per stack plus the orchestrator settings. Every
//! field is optional; an empty document describes the default two-stack deployment.
//!
//! ```toml
//! [storage]
//! stack_name = "s3BucketStack"
//! removal_policy = "retain"
//! export_name = "my-bucket"
//!
//! [delivery]
//! stack_name = "cloudFrontStack"
//! cross_region_references = true
//! web_acl_id = ""
//!
//! [delivery.cache]
//! min_ttl_secs = 1
//! default_ttl_secs = 86400
//! max_ttl_secs = 31536000
//!
//! [orchestrator]
//! max_concurrent_stacks = 4
//! ```

use crate::core::app::App;
use crate::core::cdn::{
    CachePolicy, DistributionConfig, EdgeFunction, ErrorResponse, OriginRequestPolicy,
    RequestComponent, TtlBounds, ViewerProtocolPolicy,
};
use crate::core::resource::RemovalPolicy;
use crate::core::stack::StackProps;
use crate::deploy::OrchestratorConfig;
use crate::error::{Result, StackError};
use crate::stacks::{DeliveryStack, DeliveryStackProps, StorageStack, StorageStackProps};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub stack_name: String,
    pub termination_protection: bool,
    pub auto_delete_objects: bool,
    pub removal_policy: RemovalPolicy,
    pub export_name: String,
    pub bucket_name: Option<String>,
    pub region: Option<String>,
}

impl Default for StorageSection {
    fn default() -> Self {
        StorageSection {
            stack_name: "s3BucketStack".to_string(),
            termination_protection: false,
            auto_delete_objects: false,
            removal_policy: RemovalPolicy::Retain,
            export_name: "my-bucket".to_string(),
            bucket_name: None,
            region: None,
        }
    }
}

/// Header, cookie and query-string names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComponentsSection {
    pub headers: Vec<String>,
    pub cookies: Vec<String>,
    pub query_strings: Vec<String>,
}

impl ComponentsSection {
    fn components(&self) -> Vec<RequestComponent> {
        components(&self.headers, &self.cookies, &self.query_strings)
    }
}

fn components(headers: &[String], cookies: &[String], query_strings: &[String]) -> Vec<RequestComponent> {
    headers
        .iter()
        .cloned()
        .map(RequestComponent::Header)
        .chain(cookies.iter().cloned().map(RequestComponent::Cookie))
        .chain(query_strings.iter().cloned().map(RequestComponent::QueryString))
        .collect()
}

/// `[delivery.cache]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub min_ttl_secs: u64,
    pub default_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub enable_accept_encoding_gzip: bool,
    pub enable_accept_encoding_brotli: bool,
    /// Cache key components
    pub headers: Vec<String>,
    pub cookies: Vec<String>,
    pub query_strings: Vec<String>,
}

impl Default for CacheSection {
    fn default() -> Self {
        let ttl = TtlBounds::default();
        CacheSection {
            min_ttl_secs: ttl.min.as_secs(),
            default_ttl_secs: ttl.default.as_secs(),
            max_ttl_secs: ttl.max.as_secs(),
            enable_accept_encoding_gzip: true,
            enable_accept_encoding_brotli: true,
            headers: Vec::new(),
            cookies: Vec::new(),
            query_strings: Vec::new(),
        }
    }
}

/// `[delivery]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeliverySection {
    pub stack_name: String,
    pub termination_protection: bool,
    pub cross_region_references: bool,
    pub region: Option<String>,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub default_root_object: String,
    /// Empty means no web ACL
    pub web_acl_id: String,
    pub error_responses: Vec<ErrorResponse>,
    pub edge_functions: Vec<EdgeFunction>,
    pub cache: CacheSection,
    pub origin_request: ComponentsSection,
}

impl Default for DeliverySection {
    fn default() -> Self {
        DeliverySection {
            stack_name: "cloudFrontStack".to_string(),
            termination_protection: false,
            cross_region_references: true,
            region: None,
            viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
            default_root_object: "index.html".to_string(),
            web_acl_id: String::new(),
            error_responses: Vec::new(),
            edge_functions: Vec::new(),
            cache: CacheSection::default(),
            origin_request: ComponentsSection::default(),
        }
    }
}

/// The whole deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentConfig {
    pub storage: StorageSection,
    pub delivery: DeliverySection,
    pub orchestrator: OrchestratorConfig,
}

/// An app built from a [`DeploymentConfig`], with handles to both stacks
#[derive(Debug)]
pub struct ComposedApp {
    pub app: App,
    pub storage: StorageStack,
    pub delivery: DeliveryStack,
}

impl DeploymentConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: DeploymentConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        info!("Loading deployment config from {}", path.display());
        Self::from_toml_str(&source)
    }

    /// Checks that need more than one field
    pub fn validate(&self) -> Result<()> {
        if self.storage.stack_name == self.delivery.stack_name {
            return Err(StackError::Config(format!(
                "storage and delivery share the stack name '{}'",
                self.storage.stack_name
            )));
        }
        if self.orchestrator.max_concurrent_stacks == 0 {
            return Err(StackError::Config(
                "max_concurrent_stacks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn storage_props(&self) -> StorageStackProps {
        StorageStackProps {
            stack: StackProps {
                termination_protection: self.storage.termination_protection,
                cross_region_references: false,
                region: self.storage.region.clone(),
                description: None,
            },
            auto_delete_objects: self.storage.auto_delete_objects,
            removal_policy: self.storage.removal_policy,
            export_name: self.storage.export_name.clone(),
            bucket_name: self.storage.bucket_name.clone(),
        }
    }

    pub fn delivery_props(&self) -> Result<DeliveryStackProps> {
        let section = &self.delivery;
        let cache = &section.cache;
        let ttl = TtlBounds::from_secs(
            cache.min_ttl_secs,
            cache.default_ttl_secs,
            cache.max_ttl_secs,
        );

        let distribution = DistributionConfig {
            viewer_protocol_policy: section.viewer_protocol_policy,
            default_root_object: section.default_root_object.clone(),
            error_responses: section.error_responses.clone(),
            edge_functions: section.edge_functions.clone(),
            ..Default::default()
        }
        .with_web_acl(section.web_acl_id.clone());

        Ok(DeliveryStackProps {
            stack: StackProps {
                termination_protection: section.termination_protection,
                cross_region_references: section.cross_region_references,
                region: section.region.clone(),
                description: None,
            },
            distribution,
            cache_policy: CachePolicy::build(
                ttl,
                components(&cache.headers, &cache.cookies, &cache.query_strings),
            )?
                .with_accept_encoding(
                    cache.enable_accept_encoding_gzip,
                    cache.enable_accept_encoding_brotli,
                )
                .with_comment("Policy to customize parameters that affect the cache key"),
            origin_request_policy: OriginRequestPolicy::build(section.origin_request.components())
                .with_comment("Policy to forward custom headers / cookies to origin"),
        })
    }

    /// Orchestrator settings of this deployment
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        self.orchestrator.clone()
    }

    /// Build the storage and delivery stacks into a new app
    pub fn compose(&self) -> Result<ComposedApp> {
        self.validate()?;
        let mut app = App::new();
        let storage = StorageStack::build(&mut app, &self.storage.stack_name, self.storage_props())?;
        let delivery = DeliveryStack::build(
            &mut app,
            &self.delivery.stack_name,
            &storage.bucket_name,
            self.delivery_props()?,
        )?;
        Ok(ComposedApp {
            app,
            storage,
            delivery,
        })
    }
}
