//! The validated stage graph.

use super::StageSpec;
use crate::cache::{CacheKey, CacheKeyBuilder, KeySegment};
use crate::context::RunConfig;
use std::collections::{HashMap, HashSet};

/// A directed acyclic graph of stages in canonical topological order.
#[derive(Debug, Clone)]
pub struct StageGraph {
    name: String,
    stages: HashMap<String, StageSpec>,
    execution_order: Vec<String>,
    successors: HashMap<String, Vec<String>>,
}

impl StageGraph {
    /// Creates a graph. `stage_order` is the insertion order, which breaks ties
    /// in the topological sort so the order is stable across runs.
    #[must_use]
    pub fn new(name: String, stages: HashMap<String, StageSpec>, stage_order: &[String]) -> Self {
        let execution_order = topological_sort(&stages, stage_order);
        let mut successors: HashMap<String, Vec<String>> =
            execution_order.iter().map(|n| (n.clone(), Vec::new())).collect();
        for name in &execution_order {
            if let Some(spec) = stages.get(name) {
                for dep in &spec.dependencies {
                    if let Some(list) = successors.get_mut(dep) {
                        list.push(name.clone());
                    }
                }
            }
        }

        Self {
            name,
            stages,
            execution_order,
            successors,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the graph has a stage of that name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    /// Returns the execution order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Returns a stage's specification.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&StageSpec> {
        self.stages.get(name)
    }

    /// Returns the stages that consume `name`'s output, in execution order.
    #[must_use]
    pub fn successors(&self, name: &str) -> &[String] {
        self.successors.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns every transitive dependency of `name`.
    #[must_use]
    pub fn ancestors(&self, name: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = vec![name];
        while let Some(node) = stack.pop() {
            if let Some(spec) = self.stages.get(node) {
                for dep in &spec.dependencies {
                    if seen.insert(dep.clone()) {
                        stack.push(dep);
                    }
                }
            }
        }
        seen
    }

    /// Derives every stage's cache key.
    ///
    /// A stage's key is the prefix followed by the segments of its ancestors
    /// and itself, in execution order. Along a chain each key therefore
    /// textually extends its predecessor's.
    #[must_use]
    pub fn cache_keys(&self, builder: &CacheKeyBuilder, config: &RunConfig) -> HashMap<String, CacheKey> {
        let segments: HashMap<&str, KeySegment> = self
            .execution_order
            .iter()
            .filter_map(|n| self.stages.get(n).map(|s| (n.as_str(), s.runner.key_segment(config))))
            .collect();

        self.execution_order
            .iter()
            .map(|name| {
                let ancestors = self.ancestors(name);
                let ancestry = self
                    .execution_order
                    .iter()
                    .filter(|n| *n == name || ancestors.contains(*n))
                    .filter_map(|n| segments.get(n.as_str()));
                (name.clone(), builder.build(ancestry))
            })
            .collect()
    }
}

/// Depth-first topological sort, visiting roots in insertion order.
fn topological_sort(stages: &HashMap<String, StageSpec>, stage_order: &[String]) -> Vec<String> {
    fn visit(
        node: &str,
        stages: &HashMap<String, StageSpec>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(node.to_string()) {
            return;
        }
        if let Some(spec) = stages.get(node) {
            for dep in &spec.dependencies {
                visit(dep, stages, visited, result);
            }
        }
        result.push(node.to_string());
    }

    let mut result = Vec::with_capacity(stages.len());
    let mut visited = HashSet::new();
    for name in stage_order {
        visit(name, stages, &mut visited, &mut result);
    }
    result
}
