//! Deployment orchestrator
//!
//! Applies the stacks of an [`App`] wave by wave. Stacks of one wave are independent
//! and run concurrently; a wave only starts once the previous wave's exports are in
//! the registry. Nothing is retried or rolled back: stacks applied before a failure
//! stay live.

use super::backend::{DeploymentResult, ProvisioningBackend, ResolvedStack, TeardownReport};
use crate::core::app::App;
use crate::core::graph;
use crate::core::reference::{CrossStackReference, ExportRegistry};
use crate::core::stack::Stack;
use crate::core::validation::StackName;
use crate::error::{Result, StackError};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Give up on a stack whose apply takes longer than this
    pub apply_timeout_secs: Option<u64>,

    /// Upper bound on stacks applied at the same time
    pub max_concurrent_stacks: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            apply_timeout_secs: None,
            max_concurrent_stacks: 4,
        }
    }
}

impl OrchestratorConfig {
    pub fn apply_timeout(&self) -> Option<Duration> {
        self.apply_timeout_secs.map(Duration::from_secs)
    }
}

/// Summary of one `deploy` run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub deployment_id: Uuid,
    /// Stacks in the order they were resolved
    pub order: Vec<StackName>,
    /// One result per stack, in `order`
    pub results: Vec<DeploymentResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl DeploymentReport {
    pub fn result(&self, stack: &str) -> Option<&DeploymentResult> {
        self.results.iter().find(|r| r.stack.as_str() == stack)
    }

    /// Look up an output of one stack
    pub fn output(&self, stack: &str, name: &str) -> Option<&str> {
        self.result(stack).and_then(|r| r.output(name))
    }
}

/// Drives a [`ProvisioningBackend`] through the stacks of an app
pub struct Orchestrator<B: ProvisioningBackend> {
    backend: Arc<B>,
    config: OrchestratorConfig,
    registry: RwLock<ExportRegistry>,
    /// Stacks handed to the backend and not yet torn down, published or not
    attempted: Mutex<HashSet<StackName>>,
}

impl<B: ProvisioningBackend> Orchestrator<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, OrchestratorConfig::default())
    }

    pub fn with_config(backend: B, config: OrchestratorConfig) -> Self {
        Orchestrator {
            backend: Arc::new(backend),
            config,
            registry: RwLock::new(ExportRegistry::new()),
            attempted: Mutex::new(HashSet::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Published value behind a reference
    ///
    /// Fails with `UnresolvedExportAccess` until the source stack has been applied.
    pub fn exported_value(&self, reference: &CrossStackReference) -> Result<String> {
        reference.resolve(&self.registry.read())
    }

    /// Copy of the export registry as it stands
    pub fn registry(&self) -> ExportRegistry {
        self.registry.read().clone()
    }

    /// Order the app's stacks so that sources precede consumers
    pub fn resolve_order<'a>(&self, app: &'a App) -> Result<Vec<&'a Stack>> {
        graph::resolve_order(app.stacks())
    }

    /// Render and substitute a stack for the backend
    ///
    /// Every stack it imports from must already have been applied.
    pub fn prepare(&self, stack: &Stack) -> Result<ResolvedStack> {
        let registry = self.registry.read();
        let lookup = |reference: &CrossStackReference| registry.get(reference);

        let resources = stack
            .rendered_resources()?
            .iter()
            .map(|r| r.map_configuration(|v| v.substitute_imports(&lookup)))
            .collect::<Result<Vec<_>>>()?;

        let exports = stack
            .exports()
            .iter()
            .map(|(name, v)| v.substitute_imports(&lookup).map(|v| (name.clone(), v)))
            .collect::<Result<_>>()?;

        let outputs = stack
            .outputs()
            .iter()
            .map(|(name, v)| v.substitute_imports(&lookup).map(|v| (name.clone(), v)))
            .collect::<Result<_>>()?;

        Ok(ResolvedStack {
            name: stack.name().clone(),
            props: stack.props().clone(),
            resources,
            exports,
            outputs,
        })
    }

    /// Apply one stack and publish its exports
    ///
    /// On a timeout the backend's progress is unknown, so the failure lists no applied
    /// resources; the stack is still torn down by [`Orchestrator::teardown`].
    pub async fn apply(&self, stack: &Stack) -> Result<DeploymentResult> {
        let resolved = self.prepare(stack)?;
        self.attempted.lock().insert(stack.name().clone());
        info!(
            "Applying stack '{}' ({} resources)",
            stack.name(),
            resolved.resources.len()
        );

        let outcome = match self.config.apply_timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.backend.apply(&resolved)).await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(StackError::PartialApplyFailure {
                        stack: stack.name().to_string(),
                        resource: None,
                        applied_resources: Vec::new(),
                        applied_stacks: Vec::new(),
                        reason: format!(
                            "apply timed out after {}s; applied resources unknown",
                            limit.as_secs()
                        ),
                    })
                }
            },
            None => self.backend.apply(&resolved).await,
        };

        let result = outcome.map_err(|failure| StackError::PartialApplyFailure {
            stack: stack.name().to_string(),
            resource: failure.resource,
            applied_resources: failure.completed,
            applied_stacks: Vec::new(),
            reason: failure.reason,
        })?;

        self.registry
            .write()
            .publish(stack.name().clone(), result.exported_values.clone());
        info!(
            "Applied stack '{}' ({:?}, {} exports)",
            stack.name(),
            result.status,
            result.exported_values.len()
        );
        Ok(result)
    }

    /// Apply every stack of the app in dependency order
    pub async fn deploy(&self, app: &App) -> Result<DeploymentReport> {
        let deployment_id = Uuid::new_v4();
        let started_at = Utc::now();
        let waves = graph::deployment_waves(app.stacks())?;
        let order: Vec<StackName> = self
            .resolve_order(app)?
            .into_iter()
            .map(|s| s.name().clone())
            .collect();

        info!(
            "Deployment {} started: {} stacks in {} waves",
            deployment_id,
            order.len(),
            waves.len()
        );

        let limit = self.config.max_concurrent_stacks.max(1);
        let mut applied: Vec<DeploymentResult> = Vec::new();

        for (index, wave) in waves.iter().enumerate() {
            debug!(
                "Wave {}: {:?}",
                index,
                wave.iter().map(|s| s.name().as_str()).collect::<Vec<_>>()
            );

            let outcomes: Vec<Result<DeploymentResult>> = stream::iter(wave.iter().copied())
                .map(|stack| self.apply(stack))
                .buffered(limit)
                .collect()
                .await;

            let mut failure = None;
            for outcome in outcomes {
                match outcome {
                    Ok(result) => applied.push(result),
                    Err(err) if failure.is_none() => failure = Some(err),
                    Err(err) => warn!("Additional failure in wave {}: {}", index, err),
                }
            }

            if let Some(err) = failure {
                let applied_stacks: Vec<String> =
                    applied.iter().map(|r| r.stack.to_string()).collect();
                warn!(
                    "Deployment {} stopped: {} (applied stacks stay live: {:?})",
                    deployment_id, err, applied_stacks
                );
                return Err(match err {
                    StackError::PartialApplyFailure {
                        stack,
                        resource,
                        applied_resources,
                        reason,
                        ..
                    } => StackError::PartialApplyFailure {
                        stack,
                        resource,
                        applied_resources,
                        applied_stacks,
                        reason,
                    },
                    other => other,
                });
            }
        }

        let results = order
            .iter()
            .filter_map(|name| {
                applied
                    .iter()
                    .position(|r| &r.stack == name)
                    .map(|i| applied[i].clone())
            })
            .collect();

        info!("Deployment {} complete", deployment_id);
        Ok(DeploymentReport {
            deployment_id,
            order,
            results,
            started_at,
            completed_at: Utc::now(),
        })
    }

    /// Destroy the app's stacks, consumers first
    ///
    /// Refuses before touching anything if a stack is termination protected. Stacks
    /// never handed to the backend are skipped; stacks whose apply failed are
    /// destroyed like any other so their partial resources go too.
    pub async fn teardown(&self, app: &App) -> Result<Vec<TeardownReport>> {
        if let Some(protected) = app.stacks().iter().find(|s| s.props().termination_protection) {
            return Err(StackError::TerminationProtected(protected.name().to_string()));
        }

        let mut order = self.resolve_order(app)?;
        order.reverse();

        let mut reports = Vec::new();
        for stack in order {
            let published = self.registry.read().is_published(stack.name());
            let attempted = self.attempted.lock().contains(stack.name());
            if !published && !attempted {
                debug!("Stack '{}' was never applied, skipping", stack.name());
                continue;
            }
            if !published {
                warn!(
                    "Stack '{}' failed to apply, destroying what it left behind",
                    stack.name()
                );
            }

            let resolved = self.prepare(stack)?;
            let report = self.backend.destroy(&resolved).await.map_err(|failure| {
                StackError::TeardownFailure {
                    stack: stack.name().to_string(),
                    resource: failure.resource.unwrap_or_default(),
                    reason: failure.reason,
                }
            })?;

            for retained in &report.retained {
                warn!("Retained '{}' of stack '{}'", retained, stack.name());
            }
            self.registry.write().retract(stack.name());
            self.attempted.lock().remove(stack.name());
            info!(
                "Tore down stack '{}' ({} deleted, {} retained)",
                stack.name(),
                report.deleted.len(),
                report.retained.len()
            );
            reports.push(report);
        }

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::backend::{ApplyFailure, DeploymentStatus};
    use crate::core::stack::StackProps;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    /// Records apply order and exports every export as "<stack>-value"
    #[derive(Default)]
    struct Recording {
        applied: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ProvisioningBackend for Recording {
        async fn apply(&self, stack: &ResolvedStack) -> std::result::Result<DeploymentResult, ApplyFailure> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.applied.lock().push(stack.name.to_string());
            Ok(DeploymentResult {
                stack: stack.name.clone(),
                status: DeploymentStatus::Created,
                exported_values: stack
                    .exports
                    .keys()
                    .map(|k| (k.clone(), format!("{}-value", stack.name)))
                    .collect(),
                outputs: BTreeMap::new(),
                physical_ids: BTreeMap::new(),
                completed_at: Utc::now(),
            })
        }

        async fn destroy(&self, stack: &ResolvedStack) -> std::result::Result<TeardownReport, ApplyFailure> {
            Ok(TeardownReport {
                stack: stack.name.to_string(),
                ..Default::default()
            })
        }
    }

    fn chain() -> App {
        let mut app = App::new();
        let a = app.add_stack("a", StackProps::default()).unwrap();
        app.stack_mut(a).export("out", "x").unwrap();
        let b = app.add_stack("b", StackProps::default()).unwrap();
        let reference = app.import_reference(b, a, "out").unwrap();
        app.stack_mut(b).add_output("Echo", reference).unwrap();
        app
    }

    #[tokio::test]
    async fn test_prepare_before_source_applied() {
        let app = chain();
        let orchestrator = Orchestrator::new(Recording::default());
        let consumer = app.stack_by_name("b").unwrap();

        assert!(matches!(
            orchestrator.prepare(consumer),
            Err(StackError::UnresolvedExportAccess { .. })
        ));

        let reference = &consumer.imports()[0];
        assert!(matches!(
            orchestrator.exported_value(reference),
            Err(StackError::UnresolvedExportAccess { .. })
        ));
    }

    #[tokio::test]
    async fn test_deploy_publishes_exports() {
        let app = chain();
        let orchestrator = Orchestrator::new(Recording::default());
        let report = orchestrator.deploy(&app).await.unwrap();

        assert_eq!(
            report.order.iter().map(|n| n.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(*orchestrator.backend().applied.lock(), vec!["a", "b"]);

        let reference = &app.stack_by_name("b").unwrap().imports()[0];
        assert_eq!(orchestrator.exported_value(reference).unwrap(), "a-value");
    }

    #[tokio::test]
    async fn test_apply_timeout() {
        let app = chain();
        let orchestrator = Orchestrator::with_config(
            Recording {
                delay: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            OrchestratorConfig {
                apply_timeout_secs: Some(0),
                max_concurrent_stacks: 1,
            },
        );

        let err = orchestrator.deploy(&app).await.unwrap_err();
        match err {
            StackError::PartialApplyFailure {
                stack,
                applied_resources,
                applied_stacks,
                reason,
                ..
            } => {
                assert_eq!(stack, "a");
                assert!(applied_stacks.is_empty());
                assert!(applied_resources.is_empty());
                assert!(reason.contains("applied resources unknown"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // The timed-out stack may hold resources, so teardown still reaches it
        let reports = orchestrator.teardown(&app).await.unwrap();
        let stacks: Vec<&str> = reports.iter().map(|r| r.stack.as_str()).collect();
        assert_eq!(stacks, vec!["a"]);
    }

    #[tokio::test]
    async fn test_teardown_refuses_protected_stacks() {
        let mut app = chain();
        app.add_stack(
            "locked",
            StackProps {
                termination_protection: true,
                ..Default::default()
            },
        )
        .unwrap();

        let orchestrator = Orchestrator::new(Recording::default());
        orchestrator.deploy(&app).await.unwrap();

        let err = orchestrator.teardown(&app).await.unwrap_err();
        assert!(matches!(err, StackError::TerminationProtected(name) if name == "locked"));
        assert!(orchestrator.registry().is_published(app.stack_by_name("a").unwrap().name()));
    }

    #[tokio::test]
    async fn test_teardown_reverse_order_retracts_exports() {
        let app = chain();
        let orchestrator = Orchestrator::new(Recording::default());
        orchestrator.deploy(&app).await.unwrap();

        let reports = orchestrator.teardown(&app).await.unwrap();
        let stacks: Vec<&str> = reports.iter().map(|r| r.stack.as_str()).collect();
        assert_eq!(stacks, vec!["b", "a"]);

        let reference = &app.stack_by_name("b").unwrap().imports()[0];
        assert!(matches!(
            orchestrator.exported_value(reference),
            Err(StackError::UnresolvedExportAccess { .. })
        ));
    }
}
