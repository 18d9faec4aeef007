//! Stage specifications.

use crate::errors::PipelineValidationError;
use crate::stages::Stage;
use std::sync::Arc;

/// Specification for a single stage in a pipeline.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Names of stages whose output this stage consumes, in declaration order.
    pub dependencies: Vec<String>,
    /// Whether the stage runs even when its artifact exists.
    pub always_run: bool,
}

impl StageSpec {
    /// Creates a new stage specification named after its runner.
    #[must_use]
    pub fn new(runner: Arc<dyn Stage>) -> Self {
        Self {
            name: runner.name().to_string(),
            runner,
            dependencies: Vec::new(),
            always_run: false,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies.clear();
        for dep in deps {
            self = self.with_dependency(dep);
        }
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Marks the stage as always-run.
    #[must_use]
    pub fn always_run(mut self) -> Self {
        self.always_run = true;
        self
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage depends on itself.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.dependencies.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{NormStage, QcStage};

    #[test]
    fn test_stage_spec_creation() {
        let spec = StageSpec::new(Arc::new(NormStage))
            .with_dependency("coord")
            .with_dependency("coord");

        assert_eq!(spec.name, "norm");
        assert_eq!(spec.dependencies, vec!["coord".to_string()]);
        assert!(!spec.always_run);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let spec = StageSpec::new(Arc::new(QcStage)).with_dependencies(["qc"]);
        assert!(spec.validate().is_err());
    }
}
