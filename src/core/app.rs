//! The App: owner of every stack in a deployment
//!
//! Stacks live in an arena and are addressed by [`StackId`]. Imports go through
//! [`App::import_reference`] because checking for reference cycles needs the whole
//! graph, not just the two stacks involved.

use crate::core::reference::CrossStackReference;
use crate::core::stack::{Stack, StackProps};
use crate::core::validation::{ExportName, StackName};
use crate::error::{Result, StackError};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Index of a stack inside its [`App`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackId(usize);

impl StackId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Graph of stacks handed to the orchestrator as a whole
#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
    by_name: HashMap<StackName, StackId>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty stack
    pub fn add_stack<N>(&mut self, name: N, props: StackProps) -> Result<StackId>
    where
        N: TryInto<StackName, Error = StackError>,
    {
        let name = name.try_into()?;
        if self.by_name.contains_key(&name) {
            return Err(StackError::DuplicateStackName(name.to_string()));
        }

        let id = StackId(self.stacks.len());
        info!("Added stack '{}'", name);
        self.by_name.insert(name.clone(), id);
        self.stacks.push(Stack::new(name, props));
        Ok(id)
    }

    /// Add a stack and populate it with `build`
    ///
    /// If `build` fails the stack is removed again, so a failed build leaves the app
    /// as it was and the name stays free for a retry.
    pub fn build_stack<N, T, F>(&mut self, name: N, props: StackProps, build: F) -> Result<T>
    where
        N: TryInto<StackName, Error = StackError>,
        F: FnOnce(&mut App, StackId) -> Result<T>,
    {
        let id = self.add_stack(name, props)?;
        match build(self, id) {
            Ok(built) => Ok(built),
            Err(err) => {
                self.discard(id);
                Err(err)
            }
        }
    }

    /// Drop the most recently added stack
    fn discard(&mut self, id: StackId) {
        if id.0 + 1 != self.stacks.len() {
            return;
        }
        if let Some(stack) = self.stacks.pop() {
            debug!("Discarded stack '{}' after a failed build", stack.name());
            self.by_name.remove(stack.name());
        }
    }

    /// # Panics
    ///
    /// Panics if `id` was issued by a different app.
    pub fn stack(&self, id: StackId) -> &Stack {
        &self.stacks[id.0]
    }

    /// # Panics
    ///
    /// Panics if `id` was issued by a different app.
    pub fn stack_mut(&mut self, id: StackId) -> &mut Stack {
        &mut self.stacks[id.0]
    }

    pub fn stack_by_name(&self, name: &str) -> Option<&Stack> {
        self.stack_id(name).map(|id| &self.stacks[id.0])
    }

    pub fn stack_id(&self, name: &str) -> Option<StackId> {
        self.by_name
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, id)| *id)
    }

    /// All stacks in the order they were added
    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Let `consumer` use the export `export_name` of `source`
    ///
    /// The source must already export the name. Fails with `CyclicStackDependency`
    /// when `source` depends on `consumer`, directly or transitively, or when both are
    /// the same stack. Stacks in different regions need `cross_region_references` on
    /// the consumer.
    pub fn import_reference<N>(
        &mut self,
        consumer: StackId,
        source: StackId,
        export_name: N,
    ) -> Result<CrossStackReference>
    where
        N: TryInto<ExportName, Error = StackError>,
    {
        let export_name = export_name.try_into()?;
        let source_stack = &self.stacks[source.0];
        let consumer_stack = &self.stacks[consumer.0];

        if !source_stack.exports().contains_key(&export_name) {
            return Err(StackError::UnknownExport {
                stack: source_stack.name().to_string(),
                export: export_name.to_string(),
            });
        }

        if let Some(path) = self.path_between(source, consumer) {
            let mut cycle: Vec<String> = path
                .iter()
                .map(|id| self.stacks[id.0].name().to_string())
                .collect();
            cycle.push(source_stack.name().to_string());
            return Err(StackError::CyclicStackDependency { cycle });
        }

        let consumer_region = consumer_stack.props().region.as_deref();
        let source_region = source_stack.props().region.as_deref();
        if let (Some(consumer_region), Some(source_region)) = (consumer_region, source_region) {
            if consumer_region != source_region && !consumer_stack.props().cross_region_references
            {
                return Err(StackError::CrossRegionReferencesDisabled {
                    consumer: consumer_stack.name().to_string(),
                    consumer_region: consumer_region.to_string(),
                    source_stack: source_stack.name().to_string(),
                    source_region: source_region.to_string(),
                });
            }
        }

        let reference = CrossStackReference {
            source_stack: source_stack.name().clone(),
            export_name,
        };
        debug!(
            "Stack '{}' imports '{}'",
            consumer_stack.name(),
            reference
        );
        self.stacks[consumer.0].record_import(reference.clone());
        Ok(reference)
    }

    /// Dependency path `from -> ... -> to` following imports, if one exists
    ///
    /// `from == to` yields the single-element path.
    fn path_between(&self, from: StackId, to: StackId) -> Option<Vec<StackId>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if self.search(from, to, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn search(
        &self,
        current: StackId,
        target: StackId,
        visited: &mut HashSet<StackId>,
        path: &mut Vec<StackId>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if visited.insert(current) {
            for dependency in self.stacks[current.0].dependencies() {
                if let Some(next) = self.by_name.get(dependency) {
                    if self.search(*next, target, visited, path) {
                        return true;
                    }
                }
            }
        }
        path.pop();
        false
    }
}
