//! Exact t-SNE.

use super::ensure_finite;
use super::neighbors::squared_distance;
use crate::core::{CellTable, Column, Reduction};
use crate::errors::CnaflowError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

const STAGE: &str = "tsne";
const ITERATIONS: usize = 750;
const EXAGGERATION_ITERS: usize = 100;
const EXAGGERATION: f64 = 12.0;
const LEARNING_RATE: f64 = 200.0;

/// Conditional probabilities of one point, with the Gaussian bandwidth found
/// by bisection so the distribution's entropy matches `ln(perplexity)`.
fn conditional_row(sq: &[f64], i: usize, perplexity: f64) -> Vec<f64> {
    let target = perplexity.ln();
    let (mut beta, mut lo, mut hi) = (1.0_f64, 0.0_f64, f64::INFINITY);
    let mut row = vec![0.0; sq.len()];
    for _ in 0..64 {
        let mut sum = 0.0;
        for (j, d) in sq.iter().enumerate() {
            row[j] = if j == i { 0.0 } else { (-beta * d).exp() };
            sum += row[j];
        }
        if sum <= 0.0 {
            hi = beta;
            beta = (lo + hi) / 2.0;
            continue;
        }
        let mut entropy = 0.0;
        for (j, p) in row.iter_mut().enumerate() {
            *p /= sum;
            if *p > 0.0 {
                entropy += beta * sq[j] * *p;
            }
        }
        entropy += sum.ln();
        let diff = entropy - target;
        if diff.abs() < 1e-5 {
            break;
        }
        if diff > 0.0 {
            lo = beta;
            beta = if hi.is_finite() { (lo + hi) / 2.0 } else { beta * 2.0 };
        } else {
            hi = beta;
            beta = (lo + hi) / 2.0;
        }
    }
    row
}

/// Embeds the reduction in two dimensions. Perplexity is capped at
/// `(n - 1) / 3`.
pub fn tsne(reduction: &Reduction, perplexity: f64, seed: u64) -> Result<CellTable, CnaflowError> {
    let n = reduction.cells().len();
    if n < 4 {
        return Err(CnaflowError::transform(STAGE, format!("need at least 4 cells, have {n}")));
    }
    let perplexity = perplexity.min((n - 1) as f64 / 3.0);
    let points: Vec<&[f64]> = reduction.points().collect();

    let sq: Vec<Vec<f64>> = points
        .par_iter()
        .map(|p| points.iter().map(|q| squared_distance(p, q)).collect())
        .collect();
    let conditional: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| conditional_row(&sq[i], i, perplexity))
        .collect();
    let mut p = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            p[i * n + j] = ((conditional[i][j] + conditional[j][i]) / (2.0 * n as f64)).max(1e-12);
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.gen_range(-1e-4..1e-4), rng.gen_range(-1e-4..1e-4)])
        .collect();
    let mut velocity = vec![[0.0_f64; 2]; n];
    let mut gains = vec![[1.0_f64; 2]; n];

    for iter in 0..ITERATIONS {
        let exaggeration = if iter < EXAGGERATION_ITERS { EXAGGERATION } else { 1.0 };
        let momentum = if iter < 250 { 0.5 } else { 0.8 };

        let mut num = vec![0.0; n * n];
        let mut q_sum = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let d = (y[i][0] - y[j][0]).powi(2) + (y[i][1] - y[j][1]).powi(2);
                let q = 1.0 / (1.0 + d);
                num[i * n + j] = q;
                num[j * n + i] = q;
                q_sum += 2.0 * q;
            }
        }
        let q_sum = q_sum.max(1e-12);

        for i in 0..n {
            let mut grad = [0.0_f64; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = num[i * n + j];
                let mult = 4.0 * (exaggeration * p[i * n + j] - q / q_sum) * q;
                grad[0] += mult * (y[i][0] - y[j][0]);
                grad[1] += mult * (y[i][1] - y[j][1]);
            }
            for d in 0..2 {
                gains[i][d] = if grad[d].signum() == velocity[i][d].signum() {
                    (gains[i][d] * 0.8_f64).max(0.01)
                } else {
                    gains[i][d] + 0.2
                };
                velocity[i][d] = momentum * velocity[i][d] - LEARNING_RATE * gains[i][d] * grad[d];
            }
        }
        for (point, v) in y.iter_mut().zip(&velocity) {
            point[0] += v[0];
            point[1] += v[1];
        }
        let centre = y.iter().fold([0.0; 2], |acc, p| [acc[0] + p[0], acc[1] + p[1]]);
        for point in &mut y {
            point[0] -= centre[0] / n as f64;
            point[1] -= centre[1] / n as f64;
        }
    }

    let xs: Vec<f64> = y.iter().map(|p| p[0]).collect();
    let ys: Vec<f64> = y.iter().map(|p| p[1]).collect();
    ensure_finite(STAGE, &xs)?;
    ensure_finite(STAGE, &ys)?;
    CellTable::new(reduction.cells().to_vec())?
        .with_column("tsne_1", Column::Float(xs))?
        .with_column("tsne_2", Column::Float(ys))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters() -> Reduction {
        let mut coords = Vec::new();
        for i in 0..8 {
            let offset = if i < 4 { 0.0 } else { 20.0 };
            coords.extend([offset + f64::from(i % 4) * 0.1, offset]);
        }
        Reduction::new((0..8).map(|i| format!("c{i}")).collect(), 2, coords, vec![1.0, 1.0]).unwrap()
    }

    fn dist(t: &CellTable, a: usize, b: usize) -> f64 {
        let x = t.column("tsne_1").and_then(Column::as_float).unwrap();
        let y = t.column("tsne_2").and_then(Column::as_float).unwrap();
        ((x[a] - x[b]).powi(2) + (y[a] - y[b]).powi(2)).sqrt()
    }

    #[test]
    fn test_clusters_stay_apart() {
        let t = tsne(&clusters(), 30.0, 1).unwrap();
        assert!(dist(&t, 0, 1) < dist(&t, 0, 5));
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        assert_eq!(tsne(&clusters(), 5.0, 7).unwrap(), tsne(&clusters(), 5.0, 7).unwrap());
    }

    #[test]
    fn test_too_few_cells() {
        let r = Reduction::new(vec!["a".into(), "b".into()], 1, vec![0.0, 1.0], vec![1.0]).unwrap();
        assert!(tsne(&r, 30.0, 1).is_err());
    }
}
