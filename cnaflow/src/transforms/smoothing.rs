//! Moving-average smoothing along the genome.

use crate::core::{ExpressionMatrix, GenomicMatrix};
use crate::errors::CnaflowError;
use rayon::prelude::*;
use std::ops::Range;

const STAGE: &str = "smooth";

fn smooth_block(matrix: &ExpressionMatrix, rows: Range<usize>, window: usize) -> Vec<f64> {
    let n_cols = matrix.n_cols();
    let mut out = Vec::with_capacity(rows.len() * n_cols);
    for i in rows.clone() {
        let lo = i.saturating_sub(window).max(rows.start);
        let hi = (i + window).min(rows.end - 1);
        let width = (hi - lo + 1) as f64;
        for col in 0..n_cols {
            let sum: f64 = (lo..=hi).map(|r| matrix.get(r, col)).sum();
            out.push(sum / width);
        }
    }
    out
}

/// Replaces every bin by the mean of the `window` bins on each side of it,
/// per cell and without crossing chromosome boundaries.
pub fn smooth(input: &GenomicMatrix, window: usize) -> Result<GenomicMatrix, CnaflowError> {
    let matrix = input.matrix();
    if matrix.n_rows() == 0 {
        return Err(CnaflowError::transform(STAGE, "no bins to smooth"));
    }
    let blocks: Vec<Vec<f64>> = input
        .chromosome_ranges()
        .into_par_iter()
        .map(|rows| smooth_block(matrix, rows, window))
        .collect();
    let values = blocks.concat();
    let smoothed = ExpressionMatrix::new(matrix.row_names().to_vec(), matrix.col_names().to_vec(), values)?;
    GenomicMatrix::new(smoothed, input.loci().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Locus;

    #[test]
    fn test_window_clipped_at_chromosome_ends() {
        let m = ExpressionMatrix::from_rows(
            (0..4).map(|i| format!("b{i}")).collect(),
            vec!["c".into()],
            vec![vec![0.0], vec![3.0], vec![6.0], vec![100.0]],
        )
        .unwrap();
        let loci = vec![
            Locus::new("1", 0, 1),
            Locus::new("1", 1, 2),
            Locus::new("1", 2, 3),
            Locus::new("2", 0, 1),
        ];
        let g = GenomicMatrix::new(m, loci).unwrap();

        let out = smooth(&g, 1).unwrap();
        assert_eq!(out.matrix().column(0), vec![1.5, 3.0, 4.5, 100.0]);
    }
}
