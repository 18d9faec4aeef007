//! Stage inputs with strictness enforcement.

use crate::cache::CacheKey;
use crate::core::{CellTable, CoreCells, ExpressionMatrix, GenomicMatrix, Reduction, StageData};
use crate::errors::{CnaflowError, UndeclaredDependencyError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One dependency output handed to a stage.
#[derive(Debug, Clone)]
pub struct StageInput {
    /// The cache key the output was produced or loaded under.
    pub key: CacheKey,
    /// The output itself.
    pub data: Arc<StageData>,
}

/// An immutable view of the outputs a stage declared it depends on.
///
/// Reading any other stage is an `UndeclaredDependency` error.
#[derive(Debug, Clone)]
pub struct StageInputs {
    stage_name: String,
    declared: HashSet<String>,
    outputs: HashMap<String, StageInput>,
}

impl StageInputs {
    /// Creates empty inputs for a stage.
    #[must_use]
    pub fn new(stage_name: impl Into<String>, declared: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            stage_name: stage_name.into(),
            declared: declared.into_iter().map(Into::into).collect(),
            outputs: HashMap::new(),
        }
    }

    /// Adds a dependency output.
    pub fn insert(&mut self, stage: impl Into<String>, key: CacheKey, data: Arc<StageData>) {
        self.outputs.insert(stage.into(), StageInput { key, data });
    }

    /// Returns true if the stage declared a dependency on `stage`.
    #[must_use]
    pub fn declares(&self, stage: &str) -> bool {
        self.declared.contains(stage)
    }

    /// Returns the number of outputs present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Returns true if no output is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Returns the names of the outputs present, sorted.
    #[must_use]
    pub fn stages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.outputs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Gets the output of a declared dependency.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependency` for a stage outside the declared set and
    /// `Internal` if a declared dependency was not provided.
    pub fn get(&self, stage: &str) -> Result<&StageInput, CnaflowError> {
        if !self.declared.contains(stage) {
            return Err(UndeclaredDependencyError::new(&self.stage_name, stage).into());
        }
        self.outputs.get(stage).ok_or_else(|| {
            CnaflowError::Internal(format!(
                "stage '{}' started before its dependency '{stage}' was available",
                self.stage_name
            ))
        })
    }

    fn typed<'a, T>(
        &'a self,
        stage: &str,
        expected: &str,
        extract: impl FnOnce(&'a StageData) -> Option<&'a T>,
    ) -> Result<&'a T, CnaflowError> {
        let input = self.get(stage)?;
        extract(&input.data).ok_or_else(|| {
            CnaflowError::corrupt(
                input.key.as_str(),
                format!("expected {expected} output, found {}", input.data.kind()),
            )
        })
    }

    /// Gets a dependency's per-cell table.
    pub fn table(&self, stage: &str) -> Result<&CellTable, CnaflowError> {
        self.typed(stage, "table", StageData::as_table)
    }

    /// Gets a dependency's plain matrix.
    pub fn matrix(&self, stage: &str) -> Result<&ExpressionMatrix, CnaflowError> {
        self.typed(stage, "matrix", StageData::as_matrix)
    }

    /// Gets a dependency's genomic matrix.
    pub fn genomic(&self, stage: &str) -> Result<&GenomicMatrix, CnaflowError> {
        self.typed(stage, "genomic", StageData::as_genomic)
    }

    /// Gets a dependency's core-cell set.
    pub fn core_cells(&self, stage: &str) -> Result<&CoreCells, CnaflowError> {
        self.typed(stage, "core_cells", StageData::as_core_cells)
    }

    /// Gets a dependency's reduction.
    pub fn reduction(&self, stage: &str) -> Result<&Reduction, CnaflowError> {
        self.typed(stage, "reduction", StageData::as_reduction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKeyBuilder, KeySegment};

    fn inputs() -> StageInputs {
        let key = CacheKeyBuilder::new("r").build(&[KeySegment::new("cc")]);
        let mut inputs = StageInputs::new("pca", ["smooth", "cc"]);
        inputs.insert("cc", key, Arc::new(StageData::CoreCells(CoreCells::new(["a".to_string()]))));
        inputs
    }

    #[test]
    fn test_typed_access() {
        let inputs = inputs();
        assert!(inputs.declares("cc"));
        assert_eq!(inputs.core_cells("cc").unwrap().len(), 1);
        assert_eq!(inputs.len(), 1);
    }

    #[test]
    fn test_undeclared_dependency_rejected() {
        let err = inputs().table("qc").unwrap_err();
        assert!(matches!(err, CnaflowError::UndeclaredDependency(_)));
    }

    #[test]
    fn test_wrong_kind_is_corrupt() {
        let err = inputs().genomic("cc").unwrap_err();
        match err {
            CnaflowError::CorruptArtifact { key, reason } => {
                assert_eq!(key, "r-cc");
                assert!(reason.contains("core_cells"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_declared_but_missing_is_internal() {
        assert!(matches!(inputs().genomic("smooth"), Err(CnaflowError::Internal(_))));
    }
}
