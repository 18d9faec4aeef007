//! Library-size normalization.

use super::median;
use crate::core::{ExpressionMatrix, GenomicMatrix};
use crate::errors::CnaflowError;

const STAGE: &str = "norm";

/// Scales every cell to the median library size of all cells with counts.
/// Cells without counts stay at zero.
pub fn normalize_library_size(input: &GenomicMatrix) -> Result<GenomicMatrix, CnaflowError> {
    let matrix = input.matrix();
    let sizes = matrix.column_sums();
    let positive: Vec<f64> = sizes.iter().copied().filter(|s| *s > 0.0).collect();
    if positive.is_empty() {
        return Err(CnaflowError::transform(STAGE, "every cell has zero counts"));
    }
    let target = median(&positive);
    let empty = sizes.len() - positive.len();
    if empty > 0 {
        tracing::warn!(cells = empty, "Cells without counts on mapped genes");
    }

    let scale: Vec<f64> = sizes
        .iter()
        .map(|s| if *s > 0.0 { target / s } else { 0.0 })
        .collect();
    let mut values = Vec::with_capacity(matrix.values().len());
    for row in matrix.rows() {
        values.extend(row.iter().zip(&scale).map(|(v, f)| v * f));
    }
    let normalized = ExpressionMatrix::new(
        matrix.row_names().to_vec(),
        matrix.col_names().to_vec(),
        values,
    )?;
    GenomicMatrix::new(normalized, input.loci().to_vec())
}
