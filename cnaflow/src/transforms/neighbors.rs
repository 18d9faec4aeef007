//! Exact k-nearest neighbours in reduced space.

use rayon::prelude::*;

/// Squared Euclidean distance.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Returns, for every point, its `k` nearest other points as
/// `(index, distance)` sorted by distance then index. `k` is capped at
/// `n - 1`.
pub fn knn(points: &[&[f64]], k: usize) -> Vec<Vec<(usize, f64)>> {
    let k = k.min(points.len().saturating_sub(1));
    points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let mut dists: Vec<(usize, f64)> = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, q)| (j, squared_distance(p, q).sqrt()))
                .collect();
            dists.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            dists.truncate(k);
            dists
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knn_orders_by_distance() {
        let pts: Vec<Vec<f64>> = vec![vec![0.0], vec![1.0], vec![3.0], vec![10.0]];
        let refs: Vec<&[f64]> = pts.iter().map(Vec::as_slice).collect();

        let nn = knn(&refs, 2);
        assert_eq!(nn[0], vec![(1, 1.0), (2, 3.0)]);
        assert_eq!(nn[3][0].0, 2);

        assert_eq!(knn(&refs, 10)[0].len(), 3);
    }
}
