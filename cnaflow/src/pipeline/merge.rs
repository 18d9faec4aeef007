//! The result merger.
//!
//! Joins QC metrics, community ids, embedding coordinates and optional
//! metadata into one table keyed by cell identity. A cell missing from any
//! table is dropped and reported.

use super::{BranchSelector, ExecutionReport, Resolution};
use crate::cache::ArtifactStore;
use crate::context::RunContext;
use crate::core::{CellTable, DroppedCells, StageData};
use crate::errors::CnaflowError;
use crate::events::PipelineEvent;
use std::sync::Arc;

/// The final table and what the joins dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    /// One row per cell present in every joined table.
    pub table: CellTable,
    /// One entry per join that lost cells.
    pub dropped: Vec<DroppedCells>,
}

impl MergeReport {
    /// Total number of dropped cells over all joins.
    #[must_use]
    pub fn dropped_count(&self) -> usize {
        self.dropped.iter().map(DroppedCells::count).sum()
    }
}

/// Builds the final per-cell table.
pub struct ResultMerger {
    store: Arc<dyn ArtifactStore>,
}

impl std::fmt::Debug for ResultMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultMerger").finish_non_exhaustive()
    }
}

impl ResultMerger {
    /// Creates a merger reading skipped stages from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Joins the tables in order: QC, communities, embedding, metadata.
    ///
    /// # Errors
    ///
    /// Returns `EmptyResult` if no cell survives the joins.
    pub fn join(
        qc: &CellTable,
        communities: &CellTable,
        embedding: &CellTable,
        metadata: Option<&CellTable>,
    ) -> Result<MergeReport, CnaflowError> {
        let mut dropped = Vec::new();
        let mut keep = |lost: DroppedCells| {
            if !lost.is_empty() {
                dropped.push(lost);
            }
        };

        let (table, lost) = qc.inner_join(communities, "comm")?;
        keep(lost);
        let (mut table, lost) = table.inner_join(embedding, "embedding")?;
        keep(lost);
        if let Some(metadata) = metadata {
            let (joined, lost) = table.inner_join(metadata, "metadata")?;
            keep(lost);
            table = joined;
        }

        if table.is_empty() {
            return Err(CnaflowError::EmptyResult(format!(
                "no cell is shared by all joined tables ({} QC cells, {} clustered, {} embedded)",
                qc.len(),
                communities.len(),
                embedding.len()
            )));
        }
        Ok(MergeReport { table, dropped })
    }

    /// Fetches a stage's table: the executor's retained copy, or the stored
    /// artifact for a stage that was skipped.
    pub async fn stage_table(
        &self,
        stage: &str,
        resolution: &Resolution,
        report: &ExecutionReport,
    ) -> Result<CellTable, CnaflowError> {
        let key = resolution
            .key(stage)
            .ok_or_else(|| CnaflowError::Internal(format!("stage '{stage}' is not in this run")))?;
        let data = match report.retained(stage) {
            Some(data) => data,
            None => Arc::new(self.store.load(key).await.map_err(|e| e.in_stage(stage, key.as_str()))?),
        };
        match data.as_ref() {
            StageData::Table(table) => Ok(table.clone()),
            other => Err(CnaflowError::corrupt(
                key.as_str(),
                format!("expected table output, found {}", other.kind()),
            )
            .in_stage(stage, key.as_str())),
        }
    }

    /// Collects the selected stage tables, joins them and reports drops.
    pub async fn merge(
        &self,
        selector: &BranchSelector,
        resolution: &Resolution,
        report: &ExecutionReport,
        ctx: &RunContext,
    ) -> Result<MergeReport, CnaflowError> {
        let qc = self.stage_table("qc", resolution, report).await?;
        let communities = self.stage_table("comm", resolution, report).await?;

        let mut embeddings = Vec::new();
        for stage in selector.embedding_stages() {
            embeddings.push((stage, self.stage_table(stage, resolution, report).await?));
        }
        let borrowed: Vec<(&str, &CellTable)> = embeddings.iter().map(|(s, t)| (*s, t)).collect();
        let (embedding, mut dropped) = BranchSelector::combine_embeddings(&borrowed)?;

        let metadata = ctx.metadata()?;
        let mut merged = Self::join(&qc, &communities, &embedding, metadata.as_ref())?;
        dropped.append(&mut merged.dropped);
        merged.dropped = dropped;

        for lost in &merged.dropped {
            tracing::warn!(
                table = %lost.table,
                count = lost.count(),
                "Dropped cells missing from one side of a join"
            );
            ctx.events()
                .emit_event(&PipelineEvent::MergeDroppedCells {
                    table: lost.table.clone(),
                    count: lost.count(),
                })
                .await;
        }
        tracing::info!(rows = merged.table.len(), columns = merged.table.column_names().len(), "Merged result table");
        Ok(merged)
    }
}
