//! Dependency ordering of stacks
//!
//! Edges run from a source stack to every stack importing one of its exports.
//! [`App::import_reference`] already refuses cycles; the checks here guard graphs
//! assembled some other way.
//!
//! [`App::import_reference`]: crate::core::app::App::import_reference

use crate::core::stack::Stack;
use crate::error::{Result, StackError};
use std::collections::{BTreeSet, HashMap};

/// Adjacency built from the stacks' imports, by index into the input slice
struct Graph {
    /// `dependencies[i]`: stacks `i` imports from
    dependencies: Vec<Vec<usize>>,
    /// `dependents[i]`: stacks importing from `i`
    dependents: Vec<Vec<usize>>,
}

impl Graph {
    fn build(stacks: &[Stack]) -> Result<Self> {
        let index: HashMap<&str, usize> = stacks
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name().as_str(), i))
            .collect();

        let mut dependencies = vec![Vec::new(); stacks.len()];
        let mut dependents = vec![Vec::new(); stacks.len()];
        for (i, stack) in stacks.iter().enumerate() {
            for source in stack.dependencies() {
                let j = *index
                    .get(source.as_str())
                    .ok_or_else(|| StackError::UnknownStack(source.to_string()))?;
                dependencies[i].push(j);
                dependents[j].push(i);
            }
        }

        Ok(Graph {
            dependencies,
            dependents,
        })
    }

    /// Some cycle among `remaining`, as stack names with the first repeated last
    fn find_cycle(&self, stacks: &[Stack], remaining: &BTreeSet<usize>) -> Vec<String> {
        // Every remaining node has a remaining dependency, so walking dependencies
        // from any of them must revisit a node.
        let Some(&start) = remaining.iter().next() else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut position: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut current = start;
        loop {
            let next = self.dependencies[current]
                .iter()
                .copied()
                .find(|d| remaining.contains(d));
            let Some(next) = next else {
                break;
            };
            if let Some(&at) = position.get(&next) {
                let mut cycle: Vec<String> = path[at..]
                    .iter()
                    .map(|&i| stacks[i].name().to_string())
                    .collect();
                cycle.push(stacks[next].name().to_string());
                return cycle;
            }
            position.insert(next, path.len());
            path.push(next);
            current = next;
        }

        path.iter().map(|&i| stacks[i].name().to_string()).collect()
    }
}

/// Order stacks so that every source comes before its consumers
///
/// Stable: among stacks whose dependencies are satisfied, the one listed first in
/// `stacks` goes first.
pub fn resolve_order(stacks: &[Stack]) -> Result<Vec<&Stack>> {
    let graph = Graph::build(stacks)?;
    let mut pending: Vec<usize> = graph.dependencies.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = (0..stacks.len()).filter(|&i| pending[i] == 0).collect();
    let mut ordered = Vec::with_capacity(stacks.len());

    while let Some(next) = ready.pop_first() {
        ordered.push(next);
        for &dependent in &graph.dependents[next] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if ordered.len() < stacks.len() {
        let remaining: BTreeSet<usize> = (0..stacks.len()).filter(|&i| pending[i] > 0).collect();
        return Err(StackError::CyclicStackDependency {
            cycle: graph.find_cycle(stacks, &remaining),
        });
    }

    Ok(ordered.into_iter().map(|i| &stacks[i]).collect())
}

/// Group stacks into waves that can be applied concurrently
///
/// A stack's wave is one past the latest wave of its dependencies, so no two stacks
/// of a wave are connected by a reference path. Within a wave the input order holds.
pub fn deployment_waves(stacks: &[Stack]) -> Result<Vec<Vec<&Stack>>> {
    let order = resolve_order(stacks)?;
    let mut wave_of: HashMap<&str, usize> = HashMap::new();
    let mut waves: Vec<Vec<&Stack>> = Vec::new();

    for stack in order {
        let wave = stack
            .dependencies()
            .iter()
            .filter_map(|d| wave_of.get(d.as_str()))
            .map(|w| w + 1)
            .max()
            .unwrap_or(0);
        wave_of.insert(stack.name().as_str(), wave);
        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(stack);
    }

    let position: HashMap<&str, usize> = stacks
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name().as_str(), i))
        .collect();
    for wave in &mut waves {
        wave.sort_by_key(|s| position.get(s.name().as_str()).copied());
    }

    Ok(waves)
}
