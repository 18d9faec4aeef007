//! The pipeline facade: branch selection, resolution, execution and merge
//! behind one call.

use super::{BranchSelector, ExecutionReport, NeedResolver, Resolution, ResultMerger, StageExecutor, StageGraph};
use crate::cache::{ArtifactStore, CacheKey, CacheKeyBuilder, FsArtifactStore};
use crate::cancellation::CancellationToken;
use crate::context::{RunConfig, RunContext};
use crate::core::{CellTable, DroppedCells};
use crate::errors::CnaflowError;
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::io::{FileSource, RawSource};
use crate::render::{render_logged, Chart, ChartRenderer};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Stage outputs the merge reads; the executor keeps them instead of
/// dropping them.
const MERGE_INPUTS: [&str; 4] = ["qc", "comm", "tsne", "umap"];

/// Everything one run produced.
#[derive(Debug)]
pub struct PipelineResult {
    /// The merged per-cell table.
    pub table: CellTable,
    /// Marks and keys the run executed under.
    pub resolution: Resolution,
    /// Per-stage outcomes.
    pub report: ExecutionReport,
    /// Cells lost in the merge joins.
    pub dropped: Vec<DroppedCells>,
    /// Where the table was written.
    pub output_path: PathBuf,
}

/// A configured single-cell CNA pipeline.
pub struct CnaPipeline {
    config: RunConfig,
    selector: BranchSelector,
    graph: StageGraph,
    keys: HashMap<String, CacheKey>,
    store: Arc<dyn ArtifactStore>,
    source: Arc<dyn RawSource>,
    events: Arc<dyn EventSink>,
    renderer: Option<Arc<dyn ChartRenderer>>,
    cancellation: CancellationToken,
}

impl std::fmt::Debug for CnaPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CnaPipeline")
            .field("prefix", &self.config.prefix)
            .field("selector", &self.selector)
            .field("stages", &self.graph.execution_order())
            .finish_non_exhaustive()
    }
}

impl CnaPipeline {
    /// Validates the configuration and builds the in-scope graph over a
    /// file-system store and file inputs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for unusable settings, or an I/O error
    /// if the store directory cannot be created.
    pub async fn from_config(config: RunConfig) -> Result<Self, CnaflowError> {
        let store = FsArtifactStore::open(config.store_dir.clone()).await?;
        let source = FileSource::new(config.inputs.clone());
        Self::with_parts(config, Arc::new(store), Arc::new(source))
    }

    /// Builds a pipeline over an explicit store and input source.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for unusable settings.
    pub fn with_parts(
        config: RunConfig,
        store: Arc<dyn ArtifactStore>,
        source: Arc<dyn RawSource>,
    ) -> Result<Self, CnaflowError> {
        config.validate()?;
        let selector = BranchSelector::from_config(&config);
        let graph = selector.build_graph(&config.prefix)?;
        let keys = graph.cache_keys(&CacheKeyBuilder::new(&config.prefix), &config);
        tracing::debug!(prefix = %config.prefix, stages = graph.stage_count(), "Built stage graph");

        Ok(Self {
            config,
            selector,
            graph,
            keys,
            store,
            source,
            events: Arc::new(NoOpEventSink),
            renderer: None,
            cancellation: CancellationToken::new(),
        })
    }

    /// Replaces the artifact store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the raw input source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn RawSource>) -> Self {
        self.source = source;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Overrides the renderer chosen from the configuration.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Returns the in-scope stage graph.
    #[must_use]
    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Returns `(stage, key)` pairs in execution order.
    #[must_use]
    pub fn keys(&self) -> Vec<(&str, &CacheKey)> {
        self.graph
            .execution_order()
            .iter()
            .filter_map(|s| self.keys.get(s).map(|k| (s.as_str(), k)))
            .collect()
    }

    /// Resolves every stage's mark without loading or computing anything.
    pub async fn plan(&self) -> Result<Resolution, CnaflowError> {
        NeedResolver::resolve(&self.graph, self.keys.clone(), self.store.as_ref(), self.config.use_cache).await
    }

    /// Resolves, executes, merges and writes the result table.
    ///
    /// # Errors
    ///
    /// Any stage failure aborts the run with the stage name and key. Artifacts
    /// of stages that completed stay in the store for the next run.
    pub async fn run(&self) -> Result<PipelineResult, CnaflowError> {
        let mut ctx = RunContext::new(self.config.clone(), Arc::clone(&self.source))?
            .with_events(Arc::clone(&self.events))
            .with_cancellation(self.cancellation.clone());
        if let Some(renderer) = &self.renderer {
            ctx = ctx.with_renderer(Arc::clone(renderer));
        }
        let ctx = Arc::new(ctx);
        tracing::info!(run_id = %ctx.run_id(), prefix = %self.config.prefix, "Starting run");

        let resolution = self.plan().await?;
        ctx.events()
            .emit_event(&PipelineEvent::RunResolved {
                run_id: ctx.run_id().to_string(),
                marks: resolution
                    .marks()
                    .into_iter()
                    .map(|(s, m)| (s.to_string(), m.to_string()))
                    .collect(),
            })
            .await;

        let report = StageExecutor::new(Arc::clone(&self.store))
            .with_retained(MERGE_INPUTS)
            .execute(&self.graph, &resolution, Arc::clone(&ctx))
            .await?;

        ctx.cancellation().check()?;
        let merged = ResultMerger::new(Arc::clone(&self.store))
            .merge(&self.selector, &resolution, &report, &ctx)
            .await?;

        let output_path = ctx.output_path("cells.tsv");
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        tokio::fs::write(&output_path, merged.table.to_tsv()).await?;
        tracing::info!(path = %output_path.display(), rows = merged.table.len(), "Wrote result table");

        if self.config.render.enabled {
            for stage in self.selector.embedding_stages() {
                let chart = Chart::scatter(stage, format!("{stage}_1"), format!("{stage}_2"))
                    .with_title(format!("{stage} coloured by community"))
                    .with_color("community");
                render_logged(ctx.renderer(), &chart, &merged.table);
            }
        }

        ctx.events()
            .emit_event(&PipelineEvent::RunCompleted {
                run_id: ctx.run_id().to_string(),
                rows: merged.table.len(),
                computed: report.computed_count(),
                loaded: report.loaded_count(),
            })
            .await;

        Ok(PipelineResult {
            table: merged.table,
            resolution,
            report,
            dropped: merged.dropped,
            output_path,
        })
    }
}
