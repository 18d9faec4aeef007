//! Per-invocation run context.

use super::config::RunConfig;
use crate::cancellation::CancellationToken;
use crate::core::{CellTable, ExpressionMatrix};
use crate::errors::CnaflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::io::{GeneCoordinates, RawSource};
use crate::render::{ChartRenderer, NoOpRenderer, VegaLiteRenderer};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a stage may consult besides its inputs.
///
/// One context exists per run. Raw inputs are read on first use and can be
/// released once no remaining stage needs them.
pub struct RunContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    config: Arc<RunConfig>,
    source: Arc<dyn RawSource>,
    counts: Mutex<Option<Arc<ExpressionMatrix>>>,
    coordinates: Mutex<Option<Arc<GeneCoordinates>>>,
    pool: rayon::ThreadPool,
    events: Arc<dyn EventSink>,
    renderer: Arc<dyn ChartRenderer>,
    cancellation: CancellationToken,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("prefix", &self.config.prefix)
            .field("source", &self.source)
            .field("raw_loaded", &self.raw_loaded())
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    /// Creates a context with a worker pool sized from the configuration.
    ///
    /// Charts go to the output directory when rendering is enabled.
    pub fn new(config: RunConfig, source: Arc<dyn RawSource>) -> Result<Self, CnaflowError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(|i| format!("cnaflow-worker-{i}"))
            .build()
            .map_err(|e| CnaflowError::Internal(format!("failed to build worker pool: {e}")))?;
        let renderer: Arc<dyn ChartRenderer> = if config.render.enabled {
            Arc::new(VegaLiteRenderer::new(config.output_dir.clone(), config.prefix.clone()))
        } else {
            Arc::new(NoOpRenderer)
        };

        Ok(Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            config: Arc::new(config),
            source,
            counts: Mutex::new(None),
            coordinates: Mutex::new(None),
            pool,
            events: Arc::new(NoOpEventSink),
            renderer,
            cancellation: CancellationToken::new(),
        })
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the chart renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns when the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Returns the raw counts, reading them on first use.
    pub fn counts(&self) -> Result<Arc<ExpressionMatrix>, CnaflowError> {
        let mut slot = self.counts.lock();
        if let Some(counts) = slot.as_ref() {
            return Ok(Arc::clone(counts));
        }
        tracing::info!(run_id = %self.run_id, "Reading raw counts");
        let counts = Arc::new(self.source.counts()?);
        *slot = Some(Arc::clone(&counts));
        Ok(counts)
    }

    /// Returns the gene coordinates, reading them on first use.
    pub fn coordinates(&self) -> Result<Arc<GeneCoordinates>, CnaflowError> {
        let mut slot = self.coordinates.lock();
        if let Some(coords) = slot.as_ref() {
            return Ok(Arc::clone(coords));
        }
        let coords = Arc::new(self.source.coordinates()?);
        *slot = Some(Arc::clone(&coords));
        Ok(coords)
    }

    /// Reads optional per-cell metadata.
    pub fn metadata(&self) -> Result<Option<CellTable>, CnaflowError> {
        self.source.metadata()
    }

    /// Drops the in-memory raw inputs.
    pub fn release_raw(&self) {
        if self.counts.lock().take().is_some() {
            tracing::debug!(run_id = %self.run_id, "Released raw counts");
        }
        self.coordinates.lock().take();
    }

    /// Returns true if raw counts are currently held.
    #[must_use]
    pub fn raw_loaded(&self) -> bool {
        self.counts.lock().is_some()
    }

    /// Runs a closure inside the run's worker pool.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }

    /// Returns the number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Returns the chart renderer.
    #[must_use]
    pub fn renderer(&self) -> &dyn ChartRenderer {
        self.renderer.as_ref()
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `<output_dir>/<prefix>-<suffix>`.
    #[must_use]
    pub fn output_path(&self, suffix: &str) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}-{suffix}", self.config.prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::InMemorySource;

    fn source() -> Arc<dyn RawSource> {
        let counts = ExpressionMatrix::new(vec!["g".into()], vec!["c".into()], vec![1.0]).unwrap();
        Arc::new(InMemorySource::new(counts, GeneCoordinates::new()))
    }

    #[test]
    fn test_raw_is_lazy_and_releasable() {
        let ctx = RunContext::new(RunConfig::new("r"), source()).unwrap();
        assert!(!ctx.raw_loaded());

        let a = ctx.counts().unwrap();
        let b = ctx.counts().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(ctx.raw_loaded());

        ctx.release_raw();
        assert!(!ctx.raw_loaded());
    }

    #[test]
    fn test_worker_pool_sized_from_config() {
        let ctx = RunContext::new(RunConfig::new("r").with_workers(3), source()).unwrap();
        assert_eq!(ctx.workers(), 3);
        assert_eq!(ctx.install(|| 2 + 2), 4);
    }

    #[test]
    fn test_output_path_uses_prefix() {
        let config = RunConfig::new("run1").with_output_dir("/data/out");
        let ctx = RunContext::new(config, source()).unwrap();
        assert_eq!(ctx.output_path("cells.tsv"), PathBuf::from("/data/out/run1-cells.tsv"));
    }
}
