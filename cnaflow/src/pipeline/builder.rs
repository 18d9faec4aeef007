//! Pipeline builder with validation.

use super::{StageGraph, StageSpec};
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use crate::stages::Stage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builder for creating validated stage graphs.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: HashMap<String, StageSpec>,
    stage_order: Vec<String>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: HashMap::new(),
            stage_order: Vec::new(),
        }
    }

    /// Adds a stage, named after its runner, depending on `dependencies`.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails (duplicate, missing dependency, cycle).
    pub fn stage(mut self, runner: Arc<dyn Stage>, dependencies: &[&str]) -> Result<Self, PipelineValidationError> {
        let spec = StageSpec::new(runner).with_dependencies(dependencies.iter().copied());
        self.add_stage_spec(spec)?;
        Ok(self)
    }

    /// Adds a stage with a specification.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn add_stage_spec(&mut self, spec: StageSpec) -> Result<(), PipelineValidationError> {
        spec.validate()?;

        if self.stages.contains_key(&spec.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' is defined twice",
                spec.name
            ))
            .with_stages(vec![spec.name.clone()])
            .with_error_info(
                ContractErrorInfo::new("CONTRACT-004-DUPLICATE", format!("Duplicate stage '{}'", spec.name))
                    .with_fix_hint("Every stage name must be unique within a pipeline.")
                    .with_context_entry("stage", spec.name.clone()),
            ));
        }

        for dep in &spec.dependencies {
            if !self.stages.contains_key(dep) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' depends on unknown stage '{}'",
                    spec.name, dep
                ))
                .with_stages(vec![spec.name.clone(), dep.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "CONTRACT-004-MISSING_DEP",
                        format!("Dependency '{dep}' not found"),
                    )
                    .with_fix_hint("Ensure the dependency is added before the stage that depends on it.")
                    .with_context_entry("stage", spec.name.clone())
                    .with_context_entry("dependency", dep.clone()),
                ));
            }
        }

        self.stage_order.push(spec.name.clone());
        self.stages.insert(spec.name.clone(), spec);

        self.detect_cycles()?;
        Ok(())
    }

    /// Builds the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder has no stages.
    pub fn build(self) -> Result<StageGraph, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages").with_error_info(
                ContractErrorInfo::new("CONTRACT-004-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one stage to the pipeline before building."),
            ));
        }

        Ok(StageGraph::new(self.name, self.stages, &self.stage_order))
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

    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in &self.stage_order {
            if !visited.contains(name) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(spec) = self.stages.get(node) {
            for dep in &spec.dependencies {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{CoordStage, FilterStage, QcStage};

    #[test]
    fn test_builder_with_dependencies() {
        let builder = PipelineBuilder::new("test")
            .stage(Arc::new(QcStage), &[])
            .unwrap()
            .stage(Arc::new(FilterStage), &["qc"])
            .unwrap();

        assert_eq!(builder.name(), "test");
        assert_eq!(builder.stage_count(), 2);
    }

    #[test]
    fn test_builder_missing_dependency() {
        let err = PipelineBuilder::new("test")
            .stage(Arc::new(CoordStage), &["filter"])
            .unwrap_err();

        assert_eq!(err.code(), Some("CONTRACT-004-MISSING_DEP"));
        assert_eq!(err.stages, vec!["coord".to_string(), "filter".to_string()]);
        let info = err.error_info.unwrap();
        assert_eq!(info.context.get("stage").map(String::as_str), Some("coord"));
        assert_eq!(info.context.get("dependency").map(String::as_str), Some("filter"));
    }

    #[test]
    fn test_builder_duplicate_stage() {
        let err = PipelineBuilder::new("test")
            .stage(Arc::new(QcStage), &[])
            .unwrap()
            .stage(Arc::new(QcStage), &[])
            .unwrap_err();

        assert_eq!(err.code(), Some("CONTRACT-004-DUPLICATE"));
        assert_eq!(err.error_info.unwrap().context.get("stage").map(String::as_str), Some("qc"));
    }

    #[test]
    fn test_builder_cycle_detection() {
        let mut builder = PipelineBuilder::new("test")
            .stage(Arc::new(QcStage), &[])
            .unwrap()
            .stage(Arc::new(FilterStage), &["qc"])
            .unwrap();
        // Rewire qc to depend on filter behind the builder's back.
        if let Some(spec) = builder.stages.get_mut("qc") {
            spec.dependencies.push("filter".into());
        }

        let err = builder.detect_cycles().unwrap_err();
        assert_eq!(err.error_info.code, "CONTRACT-004-CYCLE");
        assert_eq!(err.cycle_path.first(), err.cycle_path.last());
    }

    #[test]
    fn test_builder_empty_build() {
        let err = PipelineBuilder::new("test").build().unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-EMPTY"));
    }
}
