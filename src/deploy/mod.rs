//! Deployment: ordering, applying and tearing down stacks through a backend

pub mod backend;
pub mod memory;
pub mod orchestrator;

pub use backend::{
    ApplyFailure, DeploymentResult, DeploymentStatus, ProvisioningBackend, ResolvedStack,
    TeardownReport,
};
pub use memory::{BackendError, InMemoryBackend};
pub use orchestrator::{DeploymentReport, Orchestrator, OrchestratorConfig};
