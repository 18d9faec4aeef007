//! Numeric transforms behind the built-in stages.
//!
//! Every transform is a pure function of its inputs and parameters. A violated
//! precondition (empty input, non-finite values, too few cells) is reported as
//! `TransformFailure` naming the stage.

pub mod binning;
pub mod cell_cycle;
pub mod community;
pub mod coords;
pub mod filter;
pub mod neighbors;
pub mod normalize;
pub mod outliers;
pub mod pca;
pub mod qc;
pub mod smoothing;
pub mod tsne;
pub mod umap;
pub mod zscore;

use crate::errors::CnaflowError;

/// Fails if any value is NaN or infinite.
pub(crate) fn ensure_finite(stage: &str, values: &[f64]) -> Result<(), CnaflowError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(CnaflowError::transform(
            stage,
            format!("non-finite value {} at position {i}", values[i]),
        )),
        None => Ok(()),
    }
}

/// Arithmetic mean; zero for an empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around a given mean.
pub(crate) fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Median; zero for an empty slice.
pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
