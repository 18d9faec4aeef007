//! Genomic coordinate mapping.

use crate::core::{ExpressionMatrix, GenomicMatrix, Locus};
use crate::errors::CnaflowError;
use crate::io::GeneCoordinates;

const STAGE: &str = "coord";

/// Attaches a locus to every gene, drops unmapped genes and sorts rows in
/// genome order.
pub fn attach_coordinates(
    matrix: &ExpressionMatrix,
    coordinates: &GeneCoordinates,
) -> Result<GenomicMatrix, CnaflowError> {
    let mut mapped: Vec<(usize, &Locus)> = matrix
        .row_names()
        .iter()
        .enumerate()
        .filter_map(|(i, gene)| coordinates.get(gene).map(|locus| (i, locus)))
        .collect();
    if mapped.is_empty() {
        return Err(CnaflowError::transform(STAGE, "no gene has a known genomic position"));
    }
    let dropped = matrix.n_rows() - mapped.len();
    if dropped > 0 {
        tracing::debug!(dropped, "Dropped genes without coordinates");
    }

    mapped.sort_by(|a, b| a.1.genome_order(b.1).then_with(|| a.0.cmp(&b.0)));
    let rows: Vec<usize> = mapped.iter().map(|(i, _)| *i).collect();
    let loci = mapped.into_iter().map(|(_, locus)| locus.clone()).collect();
    GenomicMatrix::new(matrix.select_rows(&rows), loci)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorts_and_drops_unmapped() {
        let m = ExpressionMatrix::from_rows(
            vec!["X1".into(), "A2".into(), "A1".into(), "NOPE".into()],
            vec!["c".into()],
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]],
        )
        .unwrap();
        let coords: GeneCoordinates = [
            ("X1".to_string(), Locus::new("chrX", 5, 10)),
            ("A2".to_string(), Locus::new("chr1", 500, 600)),
            ("A1".to_string(), Locus::new("chr1", 100, 200)),
        ]
        .into_iter()
        .collect();

        let g = attach_coordinates(&m, &coords).unwrap();
        assert_eq!(
            g.matrix().row_names(),
            &["A1".to_string(), "A2".to_string(), "X1".to_string()]
        );
        assert_eq!(g.matrix().column(0), vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_no_mapped_genes_fails() {
        let m = ExpressionMatrix::from_rows(vec!["A".into()], vec!["c".into()], vec![vec![1.0]]).unwrap();
        assert!(attach_coordinates(&m, &GeneCoordinates::new()).is_err());
    }
}
