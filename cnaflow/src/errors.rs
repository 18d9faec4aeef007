//! Error types for the cnaflow pipeline.
//!
//! The taxonomy separates cache-layer failures (`NotFound`,
//! `CorruptArtifact`), input failures (`MalformedInput`), numeric stage
//! failures (`TransformFailure`), merge failures (`EmptyResult`) and
//! configuration failures (`InvalidConfiguration`). Errors raised while a
//! stage is being loaded or computed are wrapped in [`CnaflowError::Stage`]
//! so the caller learns which stage and cache key failed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for cnaflow operations.
#[derive(Debug, Error)]
pub enum CnaflowError {
    /// No artifact is stored under the key.
    #[error("Artifact not found: {key}")]
    NotFound {
        /// The cache key that was looked up.
        key: String,
    },

    /// A stored artifact could not be decoded into the expected shape.
    #[error("Corrupt artifact '{key}': {reason}")]
    CorruptArtifact {
        /// The cache key of the artifact.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Raw input data is structurally invalid.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A numeric stage rejected its input.
    #[error("Transform '{stage}' failed: {reason}")]
    TransformFailure {
        /// The stage whose precondition was violated.
        stage: String,
        /// Description of the violation.
        reason: String,
    },

    /// The result merge produced no rows.
    #[error("Empty result: {0}")]
    EmptyResult(String),

    /// The run configuration is not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A cycle was detected in the pipeline.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// An undeclared dependency was accessed.
    #[error("{0}")]
    UndeclaredDependency(#[from] UndeclaredDependencyError),

    /// The run was aborted between two stages.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// A failure attributed to one stage of the run.
    #[error("Stage '{stage}' failed (cache key {key}): {source}")]
    Stage {
        /// The failing stage.
        stage: String,
        /// The cache key of the failing stage's output.
        key: String,
        /// The underlying failure.
        #[source]
        source: Box<CnaflowError>,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CnaflowError {
    /// Creates a transform failure for a stage.
    #[must_use]
    pub fn transform(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransformFailure {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Creates a corrupt-artifact error.
    #[must_use]
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Wraps this error with the stage and key it occurred under.
    #[must_use]
    pub fn in_stage(self, stage: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            key: key.into(),
            source: Box::new(self),
        }
    }

    /// Returns the underlying error with all stage wrappers removed.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns the failing stage name, if the error is attributed to one.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            Self::TransformFailure { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CnaflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            stages: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Error raised when a stage reads the output of a stage it does not depend on.
#[derive(Debug, Clone, Error)]
#[error("Undeclared dependency: stage '{stage}' attempted to read '{dependency}' which was not declared as a dependency")]
pub struct UndeclaredDependencyError {
    /// The stage attempting access.
    pub stage: String,
    /// The undeclared stage it tried to read.
    pub dependency: String,
}

impl UndeclaredDependencyError {
    /// Creates a new undeclared dependency error.
    #[must_use]
    pub fn new(stage: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            dependency: dependency.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "bin");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"bin".to_string()));
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> c -> a"));
        assert_eq!(err.error_info.code, "CONTRACT-004-CYCLE");
    }

    #[test]
    fn test_stage_wrapper_names_stage_and_key() {
        let err = CnaflowError::transform("smooth", "non-finite values")
            .in_stage("smooth", "run1-qc-smooth.w3");

        let message = err.to_string();
        assert!(message.contains("'smooth'"));
        assert!(message.contains("run1-qc-smooth.w3"));
        assert_eq!(err.stage(), Some("smooth"));
        assert!(matches!(err.root(), CnaflowError::TransformFailure { .. }));
    }

    #[test]
    fn test_root_of_unwrapped_error_is_itself() {
        let err = CnaflowError::EmptyResult("no rows".into());
        assert!(matches!(err.root(), CnaflowError::EmptyResult(_)));
        assert_eq!(err.stage(), None);
    }
}
