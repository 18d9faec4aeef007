//! Where a run's raw inputs come from.

use super::reader::{read_coordinates, read_metadata, GeneCoordinates, RawReader, TsvMatrixReader};
use crate::context::InputConfig;
use crate::core::{CellTable, ExpressionMatrix};
use crate::errors::CnaflowError;
use std::fmt;
use std::sync::Arc;

/// Supplies raw counts, gene coordinates and optional metadata.
///
/// Calls are blocking and happen on worker threads.
pub trait RawSource: Send + Sync + fmt::Debug {
    /// Reads the gene-by-cell count matrix.
    fn counts(&self) -> Result<ExpressionMatrix, CnaflowError>;

    /// Reads the gene coordinate table.
    fn coordinates(&self) -> Result<GeneCoordinates, CnaflowError>;

    /// Reads optional per-cell metadata.
    fn metadata(&self) -> Result<Option<CellTable>, CnaflowError>;
}

/// Reads inputs from the files named in the configuration.
#[derive(Clone)]
pub struct FileSource {
    inputs: InputConfig,
    reader: Arc<dyn RawReader>,
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSource").field("inputs", &self.inputs).finish_non_exhaustive()
    }
}

impl FileSource {
    /// Creates a source reading TSV matrices.
    #[must_use]
    pub fn new(inputs: InputConfig) -> Self {
        Self {
            inputs,
            reader: Arc::new(TsvMatrixReader),
        }
    }

    /// Replaces the matrix reader.
    #[must_use]
    pub fn with_reader(mut self, reader: Arc<dyn RawReader>) -> Self {
        self.reader = reader;
        self
    }
}

impl RawSource for FileSource {
    fn counts(&self) -> Result<ExpressionMatrix, CnaflowError> {
        self.reader.read(&self.inputs.matrices)
    }

    fn coordinates(&self) -> Result<GeneCoordinates, CnaflowError> {
        let path = self.inputs.coordinates.as_ref().ok_or_else(|| {
            CnaflowError::InvalidConfiguration("inputs.coordinates is not set".into())
        })?;
        read_coordinates(path)
    }

    fn metadata(&self) -> Result<Option<CellTable>, CnaflowError> {
        self.inputs.metadata.as_deref().map(read_metadata).transpose()
    }
}

/// Serves inputs already held in memory.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    counts: ExpressionMatrix,
    coordinates: GeneCoordinates,
    metadata: Option<CellTable>,
}

impl InMemorySource {
    /// Creates a source without metadata.
    #[must_use]
    pub fn new(counts: ExpressionMatrix, coordinates: GeneCoordinates) -> Self {
        Self {
            counts,
            coordinates,
            metadata: None,
        }
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: CellTable) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl RawSource for InMemorySource {
    fn counts(&self) -> Result<ExpressionMatrix, CnaflowError> {
        Ok(self.counts.clone())
    }

    fn coordinates(&self) -> Result<GeneCoordinates, CnaflowError> {
        Ok(self.coordinates.clone())
    }

    fn metadata(&self) -> Result<Option<CellTable>, CnaflowError> {
        Ok(self.metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_source_requires_coordinates() {
        let source = FileSource::new(InputConfig::default());
        assert!(matches!(
            source.coordinates(),
            Err(CnaflowError::InvalidConfiguration(_))
        ));
        assert!(source.metadata().unwrap().is_none());
    }
}
