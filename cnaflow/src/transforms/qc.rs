//! Per-cell QC metrics.

use crate::core::{CellTable, Column, ExpressionMatrix};
use crate::errors::CnaflowError;
use regex::Regex;
use std::collections::HashSet;

const STAGE: &str = "qc";

/// Computes `total_counts`, `n_genes`, `mito_fraction` and `cc_score` for
/// every cell. `cc_score` is the share of a cell's counts on the cell-cycle
/// marker genes.
pub fn qc_metrics(
    counts: &ExpressionMatrix,
    mito: &Regex,
    cell_cycle_genes: &[String],
) -> Result<CellTable, CnaflowError> {
    if counts.n_cols() == 0 || counts.n_rows() == 0 {
        return Err(CnaflowError::transform(STAGE, "count matrix is empty"));
    }
    let markers: HashSet<&str> = cell_cycle_genes.iter().map(String::as_str).collect();
    let n = counts.n_cols();
    let mut total = vec![0.0; n];
    let mut detected = vec![0_i64; n];
    let mut mito_counts = vec![0.0; n];
    let mut cc_counts = vec![0.0; n];

    for (gene, row) in counts.row_names().iter().zip(counts.rows()) {
        let is_mito = mito.is_match(gene);
        let is_marker = markers.contains(gene.as_str());
        for (cell, &value) in row.iter().enumerate() {
            total[cell] += value;
            if value > 0.0 {
                detected[cell] += 1;
            }
            if is_mito {
                mito_counts[cell] += value;
            }
            if is_marker {
                cc_counts[cell] += value;
            }
        }
    }

    let fraction = |part: &[f64]| -> Vec<f64> {
        part.iter()
            .zip(&total)
            .map(|(p, t)| if *t > 0.0 { p / t } else { 0.0 })
            .collect()
    };
    let mito_fraction = fraction(&mito_counts);
    let cc_score = fraction(&cc_counts);

    CellTable::new(counts.col_names().to_vec())?
        .with_column("total_counts", Column::Float(total))?
        .with_column("n_genes", Column::Int(detected))?
        .with_column("mito_fraction", Column::Float(mito_fraction))?
        .with_column("cc_score", Column::Float(cc_score))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qc_metrics() {
        let counts = ExpressionMatrix::from_rows(
            vec!["MT-CO1".into(), "ACTB".into(), "MKI67".into()],
            vec!["c1".into(), "c2".into()],
            vec![vec![2.0, 0.0], vec![6.0, 4.0], vec![2.0, 0.0]],
        )
        .unwrap();
        let mito = Regex::new("^MT-").unwrap();

        let table = qc_metrics(&counts, &mito, &["MKI67".to_string()]).unwrap();

        assert_eq!(table.column("total_counts"), Some(&Column::Float(vec![10.0, 4.0])));
        assert_eq!(table.column("n_genes"), Some(&Column::Int(vec![3, 1])));
        assert_eq!(table.column("mito_fraction"), Some(&Column::Float(vec![0.2, 0.0])));
        assert_eq!(table.column("cc_score"), Some(&Column::Float(vec![0.2, 0.0])));
    }

    #[test]
    fn test_empty_matrix_fails() {
        let counts = ExpressionMatrix::new(vec![], vec![], vec![]).unwrap();
        let err = qc_metrics(&counts, &Regex::new("^MT-").unwrap(), &[]).unwrap_err();
        assert_eq!(err.stage(), Some("qc"));
    }
}
