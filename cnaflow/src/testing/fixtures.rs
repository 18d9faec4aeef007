//! Synthetic datasets and configurations for pipeline tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::Arc;

use crate::context::{FilterConfig, RunConfig};
use crate::core::{CellTable, Column, ExpressionMatrix, Locus};
use crate::io::{GeneCoordinates, InMemorySource, RawSource};

const CHROMOSOMES: [&str; 4] = ["1", "2", "3", "4"];
const GENES_PER_CHROMOSOME: usize = 40;
const MITO_GENES: [&str; 2] = ["MT-CO1", "MT-ND1"];
const CYCLE_GENES: [&str; 4] = ["MKI67", "TOP2A", "PCNA", "CDK1"];

/// Returns a one-gene, one-cell source for tests that never read raw data.
#[must_use]
pub fn tiny_source() -> Arc<dyn RawSource> {
    let counts = ExpressionMatrix::new(vec!["G1".into()], vec!["cell-0".into()], vec![1.0])
        .unwrap_or_else(|e| panic!("tiny fixture: {e}"));
    let coordinates: GeneCoordinates = [("G1".to_string(), Locus::new("1", 0, 100))].into_iter().collect();
    Arc::new(InMemorySource::new(counts, coordinates))
}

/// A seeded dataset with two clones and a few problem cells.
///
/// Clone A carries a gain of chromosome 2 and clone B a loss of chromosome 3.
/// The first `cycling` cells express the cell-cycle markers strongly and the
/// `low_quality` cells detect too few genes to survive filtering.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    /// Gene-by-cell counts.
    pub counts: ExpressionMatrix,
    /// Gene coordinates.
    pub coordinates: GeneCoordinates,
    /// Cells with a strong cell-cycle signature.
    pub cycling: Vec<String>,
    /// Cells expected to be removed by the filter.
    pub low_quality: Vec<String>,
}

impl SyntheticDataset {
    /// Generates `cells_per_clone` cells per clone plus two low-quality cells.
    #[must_use]
    pub fn generate(cells_per_clone: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut genes = Vec::new();
        let mut coordinates = GeneCoordinates::new();
        for chrom in CHROMOSOMES {
            for i in 0..GENES_PER_CHROMOSOME {
                let name = format!("G{chrom}_{i:02}");
                let start = i as u64 * 10_000;
                coordinates.insert(name.clone(), Locus::new(chrom, start, start + 5_000));
                genes.push(name);
            }
        }
        for (i, name) in CYCLE_GENES.iter().chain(MITO_GENES.iter()).enumerate() {
            let chrom = if name.starts_with("MT-") { "MT" } else { "4" };
            let start = 1_000_000 + i as u64 * 10_000;
            coordinates.insert((*name).to_string(), Locus::new(chrom, start, start + 5_000));
            genes.push((*name).to_string());
        }
        let base: Vec<f64> = genes.iter().map(|_| rng.gen_range(4.0..12.0)).collect();

        let mut cells = Vec::new();
        for clone in ["a", "b"] {
            for i in 0..cells_per_clone {
                cells.push(format!("{clone}-{i:02}"));
            }
        }
        let cycling: Vec<String> = cells.iter().take(2).cloned().collect();
        let low_quality = vec!["lowq-0".to_string(), "lowq-1".to_string()];
        cells.extend(low_quality.iter().cloned());

        let mut rows = vec![Vec::with_capacity(cells.len()); genes.len()];
        for cell in &cells {
            let low = low_quality.contains(cell);
            let cycling_cell = cycling.contains(cell);
            for (g, gene) in genes.iter().enumerate() {
                let chrom = coordinates.get(gene).map_or("", |l| l.chrom.as_str());
                let mut factor = match (cell.as_bytes()[0], chrom) {
                    (b'a', "2") => 2.5,
                    (b'b', "3") => 0.3,
                    _ => 1.0,
                };
                if cycling_cell && CYCLE_GENES.contains(&gene.as_str()) {
                    factor *= 25.0;
                }
                let value = if low && g % 8 != 0 {
                    0.0
                } else {
                    (base[g] * factor * rng.gen_range(0.6..1.4)).round().max(1.0)
                };
                rows[g].push(value);
            }
        }

        let counts = ExpressionMatrix::from_rows(genes, cells, rows)
            .unwrap_or_else(|e| panic!("synthetic fixture: {e}"));
        Self {
            counts,
            coordinates,
            cycling,
            low_quality,
        }
    }

    /// Returns the cells expected in the final table.
    #[must_use]
    pub fn kept_cells(&self) -> Vec<String> {
        self.counts
            .col_names()
            .iter()
            .filter(|c| !self.low_quality.contains(c))
            .cloned()
            .collect()
    }

    /// Wraps the dataset as a raw source.
    #[must_use]
    pub fn source(&self) -> InMemorySource {
        InMemorySource::new(self.counts.clone(), self.coordinates.clone())
    }

    /// Builds a metadata table with a `batch` column for the given cells.
    #[must_use]
    pub fn metadata_for(cells: &[String]) -> CellTable {
        let batches = cells
            .iter()
            .enumerate()
            .map(|(i, _)| if i % 2 == 0 { "b1".to_string() } else { "b2".to_string() })
            .collect();
        CellTable::new(cells.to_vec())
            .and_then(|t| t.with_column("batch", Column::Text(batches)))
            .unwrap_or_else(|e| panic!("metadata fixture: {e}"))
    }
}

/// Returns a configuration sized for [`SyntheticDataset`], with the store
/// and outputs under `root` and rendering off.
#[must_use]
pub fn fixture_config(prefix: &str, root: &Path) -> RunConfig {
    let mut config = RunConfig::new(prefix)
        .with_store_dir(root.join("cache"))
        .with_output_dir(root.join("out"))
        .with_render(false);
    config.filter = FilterConfig {
        min_genes_per_cell: 50,
        max_mito_fraction: 0.2,
        min_cells_per_gene: 3,
    };
    config.pca.components = 5;
    config.community.neighbors = 5;
    config.embedding.perplexity = 5.0;
    config.embedding.umap_neighbors = 5;
    config.embedding.epochs = 50;
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_is_seeded() {
        let a = SyntheticDataset::generate(6, 7);
        let b = SyntheticDataset::generate(6, 7);
        assert_eq!(a.counts, b.counts);
        assert_eq!(a.counts.n_cols(), 14);
        assert_eq!(a.kept_cells().len(), 12);
    }

    #[test]
    fn test_low_quality_cells_detect_few_genes() {
        let data = SyntheticDataset::generate(4, 1);
        let col = data.counts.col_names().iter().position(|c| c == "lowq-0").unwrap();
        let detected = data.counts.rows().filter(|row| row[col] > 0.0).count();
        assert!(detected < 50);
    }
}
