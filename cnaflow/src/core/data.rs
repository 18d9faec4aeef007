//! Stage payloads.
//!
//! Every stage produces exactly one [`StageData`] value; it is the unit the
//! artifact store persists under a cache key.

use super::matrix::{ExpressionMatrix, GenomicMatrix};
use super::table::CellTable;
use crate::errors::CnaflowError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-cell coordinates in principal-component space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reduction {
    cells: Vec<String>,
    n_components: usize,
    /// Row-major, one row per cell.
    coordinates: Vec<f64>,
    explained_variance: Vec<f64>,
}

impl Reduction {
    /// Creates a reduction.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if the coordinate count does not match.
    pub fn new(
        cells: Vec<String>,
        n_components: usize,
        coordinates: Vec<f64>,
        explained_variance: Vec<f64>,
    ) -> Result<Self, CnaflowError> {
        if coordinates.len() != cells.len() * n_components
            || explained_variance.len() != n_components
        {
            return Err(CnaflowError::MalformedInput(format!(
                "reduction of {} cells x {n_components} components has {} coordinates and {} variances",
                cells.len(),
                coordinates.len(),
                explained_variance.len()
            )));
        }
        Ok(Self {
            cells,
            n_components,
            coordinates,
            explained_variance,
        })
    }

    /// Returns the cell identities.
    #[must_use]
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Returns the number of components.
    #[must_use]
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Returns the coordinates of one cell.
    #[must_use]
    pub fn point(&self, cell: usize) -> &[f64] {
        &self.coordinates[cell * self.n_components..(cell + 1) * self.n_components]
    }

    /// Iterates over per-cell coordinate rows.
    pub fn points(&self) -> impl Iterator<Item = &[f64]> {
        self.coordinates.chunks_exact(self.n_components.max(1))
    }

    /// Returns the variance explained by each component.
    #[must_use]
    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }
}

/// The set of non-cycling cells used to fit the principal components.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoreCells {
    cells: BTreeSet<String>,
}

impl CoreCells {
    /// Creates a core-cell set.
    #[must_use]
    pub fn new(cells: impl IntoIterator<Item = String>) -> Self {
        Self {
            cells: cells.into_iter().collect(),
        }
    }

    /// Returns true if the cell is a core cell.
    #[must_use]
    pub fn contains(&self, cell: &str) -> bool {
        self.cells.contains(cell)
    }

    /// Returns the number of core cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if there are no core cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterates over the cells in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.cells.iter()
    }

    /// Renders the set as one identity per line.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for cell in &self.cells {
            out.push_str(cell);
            out.push('\n');
        }
        out
    }
}

/// The output of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StageData {
    /// A per-cell table (QC metrics, communities, embeddings).
    Table(CellTable),
    /// A gene-by-cell matrix without coordinates.
    Matrix(ExpressionMatrix),
    /// A matrix whose rows carry genomic loci.
    Genomic(GenomicMatrix),
    /// Non-cycling cells.
    CoreCells(CoreCells),
    /// Principal-component coordinates.
    Reduction(Reduction),
}

impl StageData {
    /// Returns the payload kind as a short name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Table(_) => "table",
            Self::Matrix(_) => "matrix",
            Self::Genomic(_) => "genomic",
            Self::CoreCells(_) => "core_cells",
            Self::Reduction(_) => "reduction",
        }
    }

    /// Returns the table, if this is a table.
    #[must_use]
    pub fn as_table(&self) -> Option<&CellTable> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the matrix, if this is a plain matrix.
    #[must_use]
    pub fn as_matrix(&self) -> Option<&ExpressionMatrix> {
        match self {
            Self::Matrix(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the genomic matrix, if this is one.
    #[must_use]
    pub fn as_genomic(&self) -> Option<&GenomicMatrix> {
        match self {
            Self::Genomic(g) => Some(g),
            _ => None,
        }
    }

    /// Returns the core cells, if this is a core-cell set.
    #[must_use]
    pub fn as_core_cells(&self) -> Option<&CoreCells> {
        match self {
            Self::CoreCells(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the reduction, if this is one.
    #[must_use]
    pub fn as_reduction(&self) -> Option<&Reduction> {
        match self {
            Self::Reduction(r) => Some(r),
            _ => None,
        }
    }

    /// Returns true if every floating point value is finite.
    ///
    /// JSON cannot carry NaN or infinity, so only finite payloads are stored.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Table(t) => t
                .column_names()
                .iter()
                .filter_map(|name| t.column(name).and_then(super::table::Column::as_float))
                .all(|values| values.iter().all(|v| v.is_finite())),
            Self::Matrix(m) => m.is_finite(),
            Self::Genomic(g) => g.matrix().is_finite(),
            Self::CoreCells(_) => true,
            Self::Reduction(r) => r
                .coordinates
                .iter()
                .chain(&r.explained_variance)
                .all(|v| v.is_finite()),
        }
    }
}
