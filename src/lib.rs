//! # stackfront - Private Bucket Behind a Content-Delivery Distribution
//!
//! `stackfront` declares two independently deployable stacks and wires them together:
//!
//! - **Storage stack**: a private, encrypted bucket plus a managed policy, role and
//!   group for read/write access; exports the bucket name
//! - **Delivery stack**: imports the bucket name, creates an origin-access identity,
//!   grants it read-only access on the bucket, and fronts the bucket with a
//!   distribution using separate cache and origin-request policies
//! - **Cross-stack references** by name, checked for cycles the moment they are made
//! - **Orchestrator** that applies stacks in dependency order through a pluggable
//!   [`ProvisioningBackend`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stackfront::{DeploymentConfig, InMemoryBackend, Orchestrator, Result, DOMAIN_OUTPUT};
//!
//! # async fn run() -> Result<()> {
//! // Default deployment: retained bucket, no auto-delete, HTTPS-only distribution
//! let composed = DeploymentConfig::default().compose()?;
//!
//! let orchestrator = Orchestrator::new(InMemoryBackend::new());
//! let report = orchestrator.deploy(&composed.app).await?;
//!
//! if let Some(url) = report.output("cloudFrontStack", DOMAIN_OUTPUT) {
//!     println!("Serving at {}", url);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Declaring Stacks by Hand
//!
//! ```rust
//! use stackfront::{App, DeliveryStack, DeliveryStackProps, StorageStack, StorageStackProps};
//!
//! # fn main() -> stackfront::Result<()> {
//! let mut app = App::new();
//! let storage = StorageStack::build(&mut app, "s3BucketStack", StorageStackProps::default())?;
//! let delivery = DeliveryStack::build(
//!     &mut app,
//!     "cloudFrontStack",
//!     &storage.bucket_name,
//!     DeliveryStackProps::default(),
//! )?;
//!
//! assert_eq!(app.stack(delivery.id).dependencies()[0].as_str(), "s3BucketStack");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod deploy;
pub mod error;
pub mod stacks;

pub use crate::config::{ComposedApp, DeploymentConfig};
pub use crate::core::{
    app::{App, StackId},
    cdn::{CachePolicy, DistributionConfig, OriginRequestPolicy, RequestComponent, TtlBounds},
    iam::{AccessGrant, AccessPolicySynthesizer, Action, ActionProfile, Principal},
    reference::{CrossStackReference, ExportHandle, ExportRegistry},
    resource::{RemovalPolicy, ResourceDescriptor, ResourceHandle, ResourceKind},
    stack::{Stack, StackProps},
    validation::{ExportName, LogicalName, StackName},
    value::{Attribute, Value},
};
pub use crate::deploy::{
    DeploymentReport, DeploymentResult, InMemoryBackend, Orchestrator, OrchestratorConfig,
    ProvisioningBackend,
};
pub use crate::error::{Result, StackError};
pub use crate::stacks::{
    DeliveryStack, DeliveryStackProps, StorageStack, StorageStackProps, DOMAIN_OUTPUT,
};
