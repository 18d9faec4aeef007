//! Cell and gene filtering on QC metrics.

use crate::context::FilterConfig;
use crate::core::{CellTable, ExpressionMatrix};
use crate::errors::CnaflowError;
use std::collections::HashMap;

const STAGE: &str = "filter";

/// Keeps cells with enough detected genes and a low mitochondrial fraction,
/// then genes detected in enough of the kept cells.
pub fn filter_cells_and_genes(
    counts: &ExpressionMatrix,
    qc: &CellTable,
    config: &FilterConfig,
) -> Result<ExpressionMatrix, CnaflowError> {
    let missing = |name: &str| CnaflowError::transform(STAGE, format!("QC table has no '{name}' column"));
    let n_genes = qc
        .column("n_genes")
        .and_then(|c| c.as_int())
        .ok_or_else(|| missing("n_genes"))?;
    let mito = qc
        .column("mito_fraction")
        .and_then(|c| c.as_float())
        .ok_or_else(|| missing("mito_fraction"))?;
    let qc_row: HashMap<&str, usize> = qc
        .cells()
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    let min_genes = i64::try_from(config.min_genes_per_cell).unwrap_or(i64::MAX);
    let mut kept_cells = Vec::new();
    for (col, cell) in counts.col_names().iter().enumerate() {
        let row = *qc_row
            .get(cell.as_str())
            .ok_or_else(|| CnaflowError::transform(STAGE, format!("cell '{cell}' has no QC metrics")))?;
        if n_genes[row] >= min_genes && mito[row] <= config.max_mito_fraction {
            kept_cells.push(col);
        }
    }
    if kept_cells.is_empty() {
        return Err(CnaflowError::transform(STAGE, "no cells pass the QC thresholds"));
    }

    let cells = counts.select_columns(&kept_cells);
    let kept_genes: Vec<usize> = cells
        .rows()
        .enumerate()
        .filter(|(_, row)| row.iter().filter(|v| **v > 0.0).count() >= config.min_cells_per_gene)
        .map(|(i, _)| i)
        .collect();
    if kept_genes.is_empty() {
        return Err(CnaflowError::transform(STAGE, "no genes pass the detection threshold"));
    }

    tracing::debug!(
        cells_in = counts.n_cols(),
        cells_out = kept_cells.len(),
        genes_in = counts.n_rows(),
        genes_out = kept_genes.len(),
        "Filtered cells and genes"
    );
    Ok(cells.select_rows(&kept_genes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;

    fn counts() -> ExpressionMatrix {
        ExpressionMatrix::from_rows(
            vec!["A".into(), "B".into(), "C".into()],
            vec!["c1".into(), "c2".into(), "c3".into()],
            vec![vec![1.0, 1.0, 1.0], vec![1.0, 0.0, 1.0], vec![0.0, 0.0, 5.0]],
        )
        .unwrap()
    }

    fn qc() -> CellTable {
        CellTable::new(vec!["c1".into(), "c2".into(), "c3".into()])
            .unwrap()
            .with_column("n_genes", Column::Int(vec![2, 1, 3]))
            .unwrap()
            .with_column("mito_fraction", Column::Float(vec![0.0, 0.0, 0.9]))
            .unwrap()
    }

    #[test]
    fn test_filters_cells_then_genes() {
        let config = FilterConfig {
            min_genes_per_cell: 1,
            max_mito_fraction: 0.5,
            min_cells_per_gene: 2,
        };
        let out = filter_cells_and_genes(&counts(), &qc(), &config).unwrap();

        assert_eq!(out.col_names(), &["c1".to_string(), "c2".to_string()]);
        assert_eq!(out.row_names(), &["A".to_string()]);
    }

    #[test]
    fn test_nothing_left_fails() {
        let config = FilterConfig {
            min_genes_per_cell: 10,
            ..FilterConfig::default()
        };
        let err = filter_cells_and_genes(&counts(), &qc(), &config).unwrap_err();
        assert!(matches!(err, CnaflowError::TransformFailure { .. }));
    }
}
