//! Cell-cycle detection from the QC cell-cycle score.

use super::{mean, std_dev};
use crate::core::{CellTable, CoreCells};
use crate::errors::CnaflowError;

const STAGE: &str = "cc";

/// Marks cells whose `cc_score` exceeds `mean + sd_threshold * sd` as
/// cycling and returns the remaining (core) cells.
pub fn detect_core_cells(qc: &CellTable, sd_threshold: f64) -> Result<CoreCells, CnaflowError> {
    let scores = qc
        .column("cc_score")
        .and_then(|c| c.as_float())
        .ok_or_else(|| CnaflowError::transform(STAGE, "QC table has no 'cc_score' column"))?;
    if scores.is_empty() {
        return Err(CnaflowError::transform(STAGE, "no cells to score"));
    }
    let m = mean(scores);
    let cutoff = m + sd_threshold * std_dev(scores, m);

    let core = CoreCells::new(
        qc.cells()
            .iter()
            .zip(scores)
            .filter(|(_, score)| **score <= cutoff)
            .map(|(cell, _)| cell.clone()),
    );
    if core.is_empty() {
        return Err(CnaflowError::transform(STAGE, "every cell was classified as cycling"));
    }
    tracing::info!(
        core = core.len(),
        cycling = scores.len() - core.len(),
        cutoff,
        "Detected cycling cells"
    );
    Ok(core)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;

    #[test]
    fn test_high_scores_are_cycling() {
        let mut scores = vec![0.01; 9];
        scores.push(0.5);
        let cells: Vec<String> = (0..10).map(|i| format!("c{i}")).collect();
        let qc = CellTable::new(cells)
            .unwrap()
            .with_column("cc_score", Column::Float(scores))
            .unwrap();

        let core = detect_core_cells(&qc, 2.0).unwrap();
        assert_eq!(core.len(), 9);
        assert!(!core.contains("c9"));
    }
}
