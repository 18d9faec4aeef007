//! Principal components by power iteration.
//!
//! Cells are samples and bins are features. Components are fitted on the core
//! cells (all cells when no core set is given) and every cell is projected.
//! The covariance matrix is never materialized: each iteration multiplies by
//! the centered data twice, and earlier components are projected out.

use crate::core::{CoreCells, GenomicMatrix, Reduction};
use crate::errors::CnaflowError;
use rayon::prelude::*;

const STAGE: &str = "pca";
const MAX_ITER: usize = 1000;
const TOLERANCE: f64 = 1e-10;

/// Centered fit data, one row per fitted cell.
struct Centered {
    rows: Vec<Vec<f64>>,
    mean: Vec<f64>,
}

fn center(input: &GenomicMatrix, fit_cells: &[usize]) -> Centered {
    let matrix = input.matrix();
    let n_features = matrix.n_rows();
    let mut rows: Vec<Vec<f64>> = fit_cells
        .iter()
        .map(|&cell| (0..n_features).map(|f| matrix.get(f, cell)).collect())
        .collect();
    let mut mean = vec![0.0; n_features];
    for row in &rows {
        for (m, v) in mean.iter_mut().zip(row) {
            *m += v;
        }
    }
    let n = rows.len() as f64;
    mean.iter_mut().for_each(|m| *m /= n);
    for row in &mut rows {
        for (v, m) in row.iter_mut().zip(&mean) {
            *v -= m;
        }
    }
    Centered { rows, mean }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(v: &mut [f64]) -> f64 {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    norm
}

fn orthogonalize(v: &mut [f64], basis: &[Vec<f64>]) {
    for b in basis {
        let d = dot(v, b);
        v.iter_mut().zip(b).for_each(|(x, y)| *x -= d * y);
    }
}

/// Covariance times a vector: `X^T (X v) / (n - 1)`.
fn cov_mul(data: &Centered, v: &[f64]) -> Vec<f64> {
    let scale = (data.rows.len() - 1) as f64;
    let projections: Vec<f64> = data.rows.par_iter().map(|row| dot(row, v)).collect();
    let mut out = vec![0.0; v.len()];
    for (row, p) in data.rows.iter().zip(projections) {
        for (o, x) in out.iter_mut().zip(row) {
            *o += x * p;
        }
    }
    out.iter_mut().for_each(|o| *o /= scale);
    out
}

fn leading_eigenvector(data: &Centered, basis: &[Vec<f64>], seed: usize) -> (f64, Vec<f64>) {
    let n = data.mean.len();
    let mut v: Vec<f64> = (0..n).map(|i| 1.0 + ((i + seed) % 7) as f64 * 0.1).collect();
    orthogonalize(&mut v, basis);
    normalize(&mut v);

    let mut eigenvalue = 0.0;
    for _ in 0..MAX_ITER {
        let mut next = cov_mul(data, &v);
        orthogonalize(&mut next, basis);
        let norm = normalize(&mut next);
        if norm == 0.0 {
            return (0.0, v);
        }
        let delta: f64 = next.iter().zip(&v).map(|(a, b)| (a - b).abs()).sum();
        v = next;
        eigenvalue = norm;
        if delta < TOLERANCE {
            break;
        }
    }
    (eigenvalue, v)
}

/// Fits `n_components` principal components and projects every cell.
pub fn pca(
    input: &GenomicMatrix,
    n_components: usize,
    core: Option<&CoreCells>,
) -> Result<Reduction, CnaflowError> {
    let matrix = input.matrix();
    let n_features = matrix.n_rows();
    if n_features == 0 {
        return Err(CnaflowError::transform(STAGE, "no bins"));
    }
    super::ensure_finite(STAGE, matrix.values())?;

    let fit_cells: Vec<usize> = match core {
        Some(core) => (0..matrix.n_cols())
            .filter(|&c| core.contains(&matrix.col_names()[c]))
            .collect(),
        None => (0..matrix.n_cols()).collect(),
    };
    if fit_cells.len() < 2 {
        return Err(CnaflowError::transform(
            STAGE,
            format!("need at least 2 cells to fit components, have {}", fit_cells.len()),
        ));
    }

    let data = center(input, &fit_cells);
    let k = n_components.min(n_features).min(fit_cells.len() - 1).max(1);
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(k);
    let mut variance = Vec::with_capacity(k);
    for i in 0..k {
        let (eigenvalue, mut vector) = leading_eigenvector(&data, &basis, i);
        let pivot = vector
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);
        if pivot < 0.0 {
            vector.iter_mut().for_each(|x| *x = -*x);
        }
        basis.push(vector);
        variance.push(eigenvalue);
    }

    let mut coordinates = Vec::with_capacity(matrix.n_cols() * k);
    for cell in 0..matrix.n_cols() {
        let centered: Vec<f64> = (0..n_features)
            .map(|f| matrix.get(f, cell) - data.mean[f])
            .collect();
        coordinates.extend(basis.iter().map(|b| dot(&centered, b)));
    }
    Reduction::new(input.cells().to_vec(), k, coordinates, variance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExpressionMatrix, Locus};

    /// Three bins, six cells spread along the first bin.
    fn genomic() -> GenomicMatrix {
        let cells: Vec<String> = (0..6).map(|i| format!("c{i}")).collect();
        let m = ExpressionMatrix::from_rows(
            vec!["b0".into(), "b1".into(), "b2".into()],
            cells,
            vec![
                vec![-5.0, -3.0, -1.0, 1.0, 3.0, 5.0],
                vec![0.1, -0.1, 0.0, 0.1, -0.1, 0.0],
                vec![0.0, 0.2, -0.2, 0.0, 0.2, -0.2],
            ],
        )
        .unwrap();
        let loci = (0..3).map(|i| Locus::new("1", i, i + 1)).collect();
        GenomicMatrix::new(m, loci).unwrap()
    }

    #[test]
    fn test_first_component_follows_dominant_bin() {
        let r = pca(&genomic(), 2, None).unwrap();
        assert_eq!(r.n_components(), 2);
        assert!(r.explained_variance()[0] > r.explained_variance()[1]);
        // sign fixed so the dominant loading is positive
        assert!(r.point(5)[0] > 4.9);
        assert!(r.point(0)[0] < -4.9);
    }

    #[test]
    fn test_core_cells_restrict_fit() {
        let core = CoreCells::new(vec!["c0".to_string(), "c1".to_string(), "c2".to_string()]);
        let r = pca(&genomic(), 1, Some(&core)).unwrap();
        assert_eq!(r.cells().len(), 6);

        let tiny = CoreCells::new(vec!["c0".to_string()]);
        assert!(pca(&genomic(), 1, Some(&tiny)).is_err());
    }
}
