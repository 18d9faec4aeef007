//! Per-bin z-scores.

use super::{ensure_finite, mean, std_dev};
use crate::core::{ExpressionMatrix, GenomicMatrix};
use crate::errors::CnaflowError;

const STAGE: &str = "zwins";

/// Z-scores every bin across cells and clips to `[-threshold, threshold]`.
/// A bin with no variance scores zero everywhere.
pub fn zscore_winsorize(input: &GenomicMatrix, threshold: f64) -> Result<GenomicMatrix, CnaflowError> {
    let matrix = input.matrix();
    if matrix.n_rows() == 0 || matrix.n_cols() == 0 {
        return Err(CnaflowError::transform(STAGE, "nothing to scale"));
    }
    ensure_finite(STAGE, matrix.values())?;

    let mut values = Vec::with_capacity(matrix.values().len());
    for row in matrix.rows() {
        let m = mean(row);
        let sd = std_dev(row, m);
        values.extend(row.iter().map(|v| {
            if sd > 0.0 {
                ((v - m) / sd).clamp(-threshold, threshold)
            } else {
                0.0
            }
        }));
    }
    let scaled = ExpressionMatrix::new(matrix.row_names().to_vec(), matrix.col_names().to_vec(), values)?;
    GenomicMatrix::new(scaled, input.loci().to_vec())
}
