//! Branch selection.
//!
//! The optional sub-pipelines are tagged variants of the run configuration,
//! so the set of in-scope stages is known before any I/O.

use super::{PipelineBuilder, StageGraph};
use crate::context::{CellCycleBranch, EmbeddingSelection, RunConfig};
use crate::core::{CellTable, DroppedCells};
use crate::errors::CnaflowError;
use crate::stages::{
    BinStage, CellCycleStage, CommunityStage, CoordStage, FilterStage, NormStage, PcaStage, QcStage,
    RmolStage, SmoothStage, TsneStage, UmapStage, ZwinsStage,
};
use std::sync::Arc;

/// The shared chain, root first.
pub const MAIN_CHAIN: [&str; 9] = ["qc", "filter", "coord", "norm", "bin", "rmol", "zwins", "smooth", "pca"];

/// Chooses which optional stages are in scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchSelector {
    cell_cycle: CellCycleBranch,
    embedding: EmbeddingSelection,
}

impl BranchSelector {
    /// Creates a selector.
    #[must_use]
    pub fn new(cell_cycle: CellCycleBranch, embedding: EmbeddingSelection) -> Self {
        Self { cell_cycle, embedding }
    }

    /// Reads the branch choices from a configuration.
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.cell_cycle, config.embedding.method)
    }

    /// Returns the selected embedding stages in execution order.
    #[must_use]
    pub fn embedding_stages(&self) -> Vec<&'static str> {
        let mut stages = Vec::with_capacity(2);
        if self.embedding.tsne() {
            stages.push("tsne");
        }
        if self.embedding.umap() {
            stages.push("umap");
        }
        stages
    }

    /// Returns every in-scope stage in execution order.
    #[must_use]
    pub fn in_scope(&self) -> Vec<&'static str> {
        let mut stages: Vec<&'static str> = MAIN_CHAIN[..8].to_vec();
        if self.cell_cycle.is_enabled() {
            stages.push("cc");
        }
        stages.extend(["pca", "comm"]);
        stages.extend(self.embedding_stages());
        stages
    }

    /// Builds the graph of in-scope stages.
    ///
    /// The embeddings depend on PCA only; community ids colour their charts
    /// at merge time.
    pub fn build_graph(&self, name: &str) -> Result<StageGraph, CnaflowError> {
        let mut builder = PipelineBuilder::new(name)
            .stage(Arc::new(QcStage), &[])?
            .stage(Arc::new(FilterStage), &["qc"])?
            .stage(Arc::new(CoordStage), &["filter"])?
            .stage(Arc::new(NormStage), &["coord"])?
            .stage(Arc::new(BinStage), &["norm"])?
            .stage(Arc::new(RmolStage), &["bin"])?
            .stage(Arc::new(ZwinsStage), &["rmol"])?
            .stage(Arc::new(SmoothStage), &["zwins"])?;
        builder = if self.cell_cycle.is_enabled() {
            builder
                .stage(Arc::new(CellCycleStage), &["qc"])?
                .stage(Arc::new(PcaStage), &["smooth", "cc"])?
        } else {
            builder.stage(Arc::new(PcaStage), &["smooth"])?
        };
        builder = builder.stage(Arc::new(CommunityStage), &["pca"])?;
        if self.embedding.tsne() {
            builder = builder.stage(Arc::new(TsneStage), &["pca"])?;
        }
        if self.embedding.umap() {
            builder = builder.stage(Arc::new(UmapStage), &["pca"])?;
        }
        Ok(builder.build()?)
    }

    /// Joins the selected embedding tables on cell identity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if no table is given.
    pub fn combine_embeddings(tables: &[(&str, &CellTable)]) -> Result<(CellTable, Vec<DroppedCells>), CnaflowError> {
        let ((_, first), rest) = tables
            .split_first()
            .ok_or_else(|| CnaflowError::InvalidConfiguration("no embedding method selected".into()))?;
        let mut combined = (*first).clone();
        let mut dropped = Vec::new();
        for (label, table) in rest {
            let (joined, lost) = combined.inner_join(table, label)?;
            if !lost.is_empty() {
                dropped.push(lost);
            }
            combined = joined;
        }
        Ok((combined, dropped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;

    #[test]
    fn test_default_scope() {
        let selector = BranchSelector::from_config(&RunConfig::new("r"));
        assert_eq!(
            selector.in_scope(),
            vec!["qc", "filter", "coord", "norm", "bin", "rmol", "zwins", "smooth", "pca", "comm", "tsne"]
        );
        let graph = selector.build_graph("r").unwrap();
        assert_eq!(graph.execution_order(), selector.in_scope().as_slice());
    }

    #[test]
    fn test_full_scope_graph() {
        let selector = BranchSelector::new(
            CellCycleBranch::Detect { sd_threshold: 2.0 },
            EmbeddingSelection::Both,
        );
        let graph = selector.build_graph("r").unwrap();

        assert_eq!(graph.execution_order(), selector.in_scope().as_slice());
        assert_eq!(graph.successors("qc"), &["filter", "cc"]);
        assert_eq!(graph.successors("pca"), &["comm", "tsne", "umap"]);
        assert_eq!(graph.spec("pca").unwrap().dependencies, vec!["smooth", "cc"]);
    }

    #[test]
    fn test_combine_embeddings_matches_cells() {
        let tsne = CellTable::new(vec!["a".into(), "b".into(), "c".into()])
            .unwrap()
            .with_column("tsne_1", Column::Float(vec![1.0, 2.0, 3.0]))
            .unwrap();
        let umap = CellTable::new(vec!["c".into(), "a".into()])
            .unwrap()
            .with_column("umap_1", Column::Float(vec![30.0, 10.0]))
            .unwrap();

        let (combined, dropped) = BranchSelector::combine_embeddings(&[("tsne", &tsne), ("umap", &umap)]).unwrap();
        assert_eq!(combined.cells(), &["a".to_string(), "c".to_string()]);
        assert_eq!(combined.column("umap_1").and_then(Column::as_float), Some(&[10.0, 30.0][..]));
        assert_eq!(dropped[0].missing_right, vec!["b".to_string()]);
    }

    #[test]
    fn test_combine_requires_a_table() {
        assert!(matches!(
            BranchSelector::combine_embeddings(&[]),
            Err(CnaflowError::InvalidConfiguration(_))
        ));
    }
}
