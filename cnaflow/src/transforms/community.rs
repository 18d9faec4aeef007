//! Graph-based community detection.
//!
//! Cells are linked to their k nearest neighbours in PC space, edges are
//! weighted by the Jaccard overlap of the two neighbourhoods, and communities
//! are found by greedy local moving on modularity.

use super::neighbors::knn;
use crate::core::{CellTable, Column, Reduction};
use crate::errors::CnaflowError;
use std::collections::{BTreeMap, HashMap};

const STAGE: &str = "comm";
const MAX_PASSES: usize = 50;

fn jaccard(a: &[usize], b: &[usize]) -> f64 {
    let shared = a.iter().filter(|x| b.binary_search(x).is_ok()).count();
    let union = a.len() + b.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

/// Builds the shared-nearest-neighbour graph as adjacency lists.
pub fn snn_graph(reduction: &Reduction, k: usize) -> Vec<Vec<(usize, f64)>> {
    let points: Vec<&[f64]> = reduction.points().collect();
    let nn = knn(&points, k);
    let sets: Vec<Vec<usize>> = nn
        .iter()
        .enumerate()
        .map(|(i, neighbors)| {
            let mut set: Vec<usize> = neighbors.iter().map(|(j, _)| *j).collect();
            set.push(i);
            set.sort_unstable();
            set
        })
        .collect();

    let mut edges: HashMap<(usize, usize), f64> = HashMap::new();
    for (i, neighbors) in nn.iter().enumerate() {
        for &(j, _) in neighbors {
            let w = jaccard(&sets[i], &sets[j]);
            let entry = edges.entry((i.min(j), i.max(j))).or_insert(0.0);
            *entry = entry.max(w);
        }
    }

    let mut adjacency = vec![Vec::new(); points.len()];
    for ((i, j), w) in edges {
        if w > 0.0 {
            adjacency[i].push((j, w));
            adjacency[j].push((i, w));
        }
    }
    for list in &mut adjacency {
        list.sort_by_key(|(j, _)| *j);
    }
    adjacency
}

/// Assigns communities by modularity local moving. Ids are renumbered by
/// first appearance.
pub fn local_moving(adjacency: &[Vec<(usize, f64)>]) -> Vec<i64> {
    let n = adjacency.len();
    let degree: Vec<f64> = adjacency
        .iter()
        .map(|list| list.iter().map(|(_, w)| w).sum())
        .collect();
    let two_m: f64 = degree.iter().sum();
    let mut community: Vec<usize> = (0..n).collect();

    if two_m > 0.0 {
        let mut total = degree.clone();
        for _ in 0..MAX_PASSES {
            let mut moved = false;
            for i in 0..n {
                let current = community[i];
                total[current] -= degree[i];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(j, w) in &adjacency[i] {
                    *links.entry(community[j]).or_insert(0.0) += w;
                }
                let gain = |c: usize, w: f64| w - total[c] * degree[i] / two_m;
                let mut best = current;
                let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
                for (&c, &w) in &links {
                    let g = gain(c, w);
                    if g > best_gain + 1e-12 {
                        best = c;
                        best_gain = g;
                    }
                }

                community[i] = best;
                total[best] += degree[i];
                moved |= best != current;
            }
            if !moved {
                break;
            }
        }
    }

    let mut ids: HashMap<usize, i64> = HashMap::new();
    community
        .iter()
        .map(|c| {
            let next = i64::try_from(ids.len()).unwrap_or(i64::MAX);
            *ids.entry(*c).or_insert(next)
        })
        .collect()
}

/// Detects communities and returns them as a `community` column.
pub fn detect_communities(reduction: &Reduction, k: usize) -> Result<CellTable, CnaflowError> {
    if reduction.cells().len() < 2 {
        return Err(CnaflowError::transform(STAGE, "need at least 2 cells"));
    }
    let communities = local_moving(&snn_graph(reduction, k));
    let distinct = communities.iter().max().map_or(0, |m| m + 1);
    tracing::info!(communities = distinct, cells = communities.len(), "Detected communities");
    CellTable::new(reduction.cells().to_vec())?.with_column("community", Column::Int(communities))
}
