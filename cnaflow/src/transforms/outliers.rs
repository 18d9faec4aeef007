//! Removal of bins with outlying mean expression.

use super::mean;
use crate::context::OutlierFilter;
use crate::core::GenomicMatrix;
use crate::errors::CnaflowError;

const STAGE: &str = "rmol";

/// Linear-interpolated quantile of unsorted values.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Drops bins whose mean expression exceeds the configured quantile of all
/// bin means.
pub fn remove_outlier_bins(input: &GenomicMatrix, filter: OutlierFilter) -> Result<GenomicMatrix, CnaflowError> {
    let OutlierFilter::Quantile(q) = filter else {
        return Ok(input.clone());
    };
    let means: Vec<f64> = input.matrix().rows().map(mean).collect();
    if means.is_empty() {
        return Err(CnaflowError::transform(STAGE, "no bins"));
    }
    let threshold = quantile(&means, q);
    let keep: Vec<usize> = means
        .iter()
        .enumerate()
        .filter(|(_, m)| **m <= threshold)
        .map(|(i, _)| i)
        .collect();
    tracing::debug!(threshold, removed = means.len() - keep.len(), "Removed outlier bins");
    Ok(input.select_rows(&keep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExpressionMatrix, Locus};

    fn genomic() -> GenomicMatrix {
        let rows: Vec<Vec<f64>> = (1..=10).map(|i| vec![f64::from(i)]).collect();
        let names = (0..10).map(|i| format!("b{i}")).collect();
        let loci = (0..10).map(|i| Locus::new("1", i, i + 1)).collect();
        GenomicMatrix::new(ExpressionMatrix::from_rows(names, vec!["c".into()], rows).unwrap(), loci).unwrap()
    }

    #[test]
    fn test_quantile_interpolates() {
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.5), 2.5);
        assert_eq!(quantile(&[5.0], 0.99), 5.0);
    }

    #[test]
    fn test_drops_top_bins() {
        let out = remove_outlier_bins(&genomic(), OutlierFilter::Quantile(0.85)).unwrap();
        // threshold 8.65: bins 9 and 10 go
        assert_eq!(out.loci().len(), 8);
    }

    #[test]
    fn test_disabled_passes_through() {
        let g = genomic();
        assert_eq!(remove_outlier_bins(&g, OutlierFilter::Disabled).unwrap(), g);
    }
}
