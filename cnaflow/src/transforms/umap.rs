//! A compact UMAP: fuzzy k-NN graph plus seeded SGD layout with negative
//! sampling.

use super::ensure_finite;
use super::neighbors::knn;
use crate::core::{CellTable, Column, Reduction};
use crate::errors::CnaflowError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

const STAGE: &str = "umap";
/// Curve parameters for `min_dist = 0.1`, `spread = 1.0`.
const A: f64 = 1.929;
const B: f64 = 0.7915;
const NEGATIVE_SAMPLES: usize = 5;
const CLIP: f64 = 4.0;

/// Finds `sigma` so that `sum exp(-(d - rho) / sigma) = log2(k)`.
fn smooth_distances(distances: &[f64]) -> (f64, f64) {
    let rho = distances.first().copied().unwrap_or(0.0);
    let target = (distances.len().max(2) as f64).log2();
    let (mut lo, mut hi, mut sigma) = (0.0_f64, f64::INFINITY, 1.0_f64);
    for _ in 0..64 {
        let psum: f64 = distances
            .iter()
            .map(|d| (-((d - rho).max(0.0)) / sigma).exp())
            .sum();
        if (psum - target).abs() < 1e-5 {
            break;
        }
        if psum > target {
            hi = sigma;
            sigma = (lo + hi) / 2.0;
        } else {
            lo = sigma;
            sigma = if hi.is_finite() { (lo + hi) / 2.0 } else { sigma * 2.0 };
        }
    }
    (rho, sigma.max(1e-3))
}

/// Symmetric fuzzy-union edge list `(i, j, weight)` with `i < j`.
fn fuzzy_graph(points: &[&[f64]], k: usize) -> Vec<(usize, usize, f64)> {
    let nn = knn(points, k);
    let mut directed: HashMap<(usize, usize), f64> = HashMap::new();
    for (i, neighbors) in nn.iter().enumerate() {
        let distances: Vec<f64> = neighbors.iter().map(|(_, d)| *d).collect();
        let (rho, sigma) = smooth_distances(&distances);
        for &(j, d) in neighbors {
            directed.insert((i, j), (-((d - rho).max(0.0)) / sigma).exp());
        }
    }
    let mut edges: Vec<(usize, usize, f64)> = directed
        .iter()
        .filter(|((i, j), _)| i < j || !directed.contains_key(&(*j, *i)))
        .map(|(&(i, j), &w)| {
            let back = directed.get(&(j, i)).copied().unwrap_or(0.0);
            (i.min(j), i.max(j), w + back - w * back)
        })
        .collect();
    edges.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    edges
}

/// Embeds the reduction in two dimensions.
pub fn umap(reduction: &Reduction, n_neighbors: usize, epochs: usize, seed: u64) -> Result<CellTable, CnaflowError> {
    let n = reduction.cells().len();
    if n < 3 {
        return Err(CnaflowError::transform(STAGE, format!("need at least 3 cells, have {n}")));
    }
    let points: Vec<&[f64]> = reduction.points().collect();
    let edges = fuzzy_graph(&points, n_neighbors.max(2));
    let max_weight = edges.iter().map(|e| e.2).fold(0.0, f64::max);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0)])
        .collect();

    for epoch in 0..epochs {
        let alpha = 1.0 - epoch as f64 / epochs as f64;
        for &(i, j, w) in &edges {
            if max_weight <= 0.0 || rng.gen::<f64>() > w / max_weight {
                continue;
            }
            let d2 = (y[i][0] - y[j][0]).powi(2) + (y[i][1] - y[j][1]).powi(2);
            if d2 > 0.0 {
                let coeff = -2.0 * A * B * d2.powf(B - 1.0) / (1.0 + A * d2.powf(B));
                for d in 0..2 {
                    let g = (coeff * (y[i][d] - y[j][d])).clamp(-CLIP, CLIP) * alpha;
                    y[i][d] += g;
                    y[j][d] -= g;
                }
            }
            for _ in 0..NEGATIVE_SAMPLES {
                let other = rng.gen_range(0..n);
                if other == i {
                    continue;
                }
                let d2 = (y[i][0] - y[other][0]).powi(2) + (y[i][1] - y[other][1]).powi(2);
                let coeff = 2.0 * B / ((0.001 + d2) * (1.0 + A * d2.powf(B)));
                for d in 0..2 {
                    let g = (coeff * (y[i][d] - y[other][d])).clamp(-CLIP, CLIP) * alpha;
                    y[i][d] += g;
                }
            }
        }
    }

    let xs: Vec<f64> = y.iter().map(|p| p[0]).collect();
    let ys: Vec<f64> = y.iter().map(|p| p[1]).collect();
    ensure_finite(STAGE, &xs)?;
    ensure_finite(STAGE, &ys)?;
    CellTable::new(reduction.cells().to_vec())?
        .with_column("umap_1", Column::Float(xs))?
        .with_column("umap_2", Column::Float(ys))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters() -> Reduction {
        let mut coords = Vec::new();
        for i in 0..12 {
            let offset = if i < 6 { 0.0 } else { 50.0 };
            coords.extend([offset + f64::from(i % 6) * 0.2, offset + f64::from(i % 3) * 0.1]);
        }
        Reduction::new((0..12).map(|i| format!("c{i}")).collect(), 2, coords, vec![1.0, 1.0]).unwrap()
    }

    #[test]
    fn test_fuzzy_graph_is_symmetric_union() {
        let pts: Vec<Vec<f64>> = vec![vec![0.0], vec![1.0], vec![2.0], vec![10.0]];
        let refs: Vec<&[f64]> = pts.iter().map(Vec::as_slice).collect();
        let edges = fuzzy_graph(&refs, 2);
        assert!(edges.iter().all(|(i, j, w)| i < j && *w > 0.0 && *w <= 1.0));
        let mut pairs: Vec<(usize, usize)> = edges.iter().map(|(i, j, _)| (*i, *j)).collect();
        pairs.dedup();
        assert_eq!(pairs.len(), edges.len());
    }

    #[test]
    fn test_umap_is_seeded() {
        let a = umap(&clusters(), 5, 50, 3).unwrap();
        let b = umap(&clusters(), 5, 50, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.column_names(), vec!["umap_1", "umap_2"]);
    }
}
