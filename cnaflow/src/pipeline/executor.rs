//! The stage executor.
//!
//! Walks the graph once in execution order and loads, computes or skips
//! each stage according to its mark. Outputs are held only while a
//! computing successor still needs them.

use super::{Resolution, StageGraph};
use crate::cache::{ArtifactStore, CacheKey, SaveOutcome};
use crate::context::RunContext;
use crate::core::{StageData, StageMark, StageOutcome};
use crate::errors::CnaflowError;
use crate::events::PipelineEvent;
use crate::observability::{SpanTimer, StageSpanAttributes};
use crate::render::render_logged;
use crate::stages::StageInputs;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What happened to each stage during one pass.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    outcomes: Vec<(String, StageOutcome)>,
    durations_ms: HashMap<String, f64>,
    retained: HashMap<String, Arc<StageData>>,
}

impl ExecutionReport {
    /// Returns `(stage, outcome)` pairs in execution order.
    #[must_use]
    pub fn outcomes(&self) -> &[(String, StageOutcome)] {
        &self.outcomes
    }

    /// Returns the outcome of a stage.
    #[must_use]
    pub fn outcome(&self, stage: &str) -> Option<StageOutcome> {
        self.outcomes.iter().find(|(s, _)| s == stage).map(|(_, o)| *o)
    }

    /// Returns the wall time spent loading or computing a stage.
    #[must_use]
    pub fn duration_ms(&self, stage: &str) -> Option<f64> {
        self.durations_ms.get(stage).copied()
    }

    /// Returns the stages whose compute function ran.
    #[must_use]
    pub fn computed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.computed())
            .map(|(s, _)| s.as_str())
            .collect()
    }

    /// Counts computed stages.
    #[must_use]
    pub fn computed_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.computed()).count()
    }

    /// Counts loaded stages.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == StageOutcome::Loaded).count()
    }

    /// Returns a retained stage output, if the stage produced one this run.
    #[must_use]
    pub fn retained(&self, stage: &str) -> Option<Arc<StageData>> {
        self.retained.get(stage).cloned()
    }
}

/// Runs a resolved graph against an artifact store.
pub struct StageExecutor {
    store: Arc<dyn ArtifactStore>,
    retain: HashSet<String>,
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor").field("retain", &self.retain).finish_non_exhaustive()
    }
}

impl StageExecutor {
    /// Creates an executor writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            retain: HashSet::new(),
        }
    }

    /// Keeps these stages' outputs after the pass so the merge can reuse
    /// them without a reload.
    #[must_use]
    pub fn with_retained(mut self, stages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.retain.extend(stages.into_iter().map(Into::into));
        self
    }

    /// Executes every stage per its mark.
    ///
    /// # Errors
    ///
    /// The first load, compute or save failure aborts the pass, wrapped with
    /// the stage name and key. Artifacts already published stay valid.
    pub async fn execute(
        &self,
        graph: &StageGraph,
        resolution: &Resolution,
        ctx: Arc<RunContext>,
    ) -> Result<ExecutionReport, CnaflowError> {
        let order = graph.execution_order();
        let mark_of = |name: &str| resolution.mark(name).unwrap_or(StageMark::MustRun);

        // Consumers still to run, per needed output.
        let mut pending: HashMap<&str, usize> = order
            .iter()
            .map(|name| {
                let consumers = graph
                    .successors(name)
                    .iter()
                    .filter(|s| mark_of(s) == StageMark::MustRun)
                    .count();
                (name.as_str(), consumers)
            })
            .collect();
        let last_raw_reader = order.iter().rposition(|name| {
            mark_of(name) == StageMark::MustRun && graph.spec(name).is_some_and(|s| s.runner.reads_raw())
        });

        let mut live: HashMap<String, Arc<StageData>> = HashMap::new();
        let mut report = ExecutionReport::default();

        for (index, name) in order.iter().enumerate() {
            ctx.cancellation().check()?;

            let spec = graph
                .spec(name)
                .ok_or_else(|| CnaflowError::Internal(format!("stage '{name}' missing from graph")))?;
            let key = resolution
                .key(name)
                .ok_or_else(|| CnaflowError::Internal(format!("no cache key for stage '{name}'")))?;
            let mark = mark_of(name);
            let timer = SpanTimer::start(name.clone());

            let outcome = match mark {
                StageMark::Skip => {
                    ctx.events()
                        .emit_event(&PipelineEvent::StageSkipped {
                            stage: name.clone(),
                            key: key.to_string(),
                        })
                        .await;
                    StageOutcome::Skipped
                }
                StageMark::MustLoad => {
                    let data = self.store.load(key).await.map_err(|e| e.in_stage(name, key.as_str()))?;
                    live.insert(name.clone(), Arc::new(data));
                    ctx.events()
                        .emit_event(&PipelineEvent::StageLoaded {
                            stage: name.clone(),
                            key: key.to_string(),
                            duration_ms: timer.elapsed_ms(),
                        })
                        .await;
                    StageOutcome::Loaded
                }
                StageMark::MustRun => {
                    let mut inputs = StageInputs::new(name.clone(), spec.dependencies.iter().cloned());
                    for dep in &spec.dependencies {
                        let data = live.get(dep).ok_or_else(|| {
                            CnaflowError::Internal(format!("output of '{dep}' is not live for '{name}'"))
                                .in_stage(name, key.as_str())
                        })?;
                        let dep_key = resolution.key(dep).cloned().unwrap_or_else(|| key.clone());
                        inputs.insert(dep.clone(), dep_key, Arc::clone(data));
                    }

                    match self.compute(spec.runner.clone(), inputs, &ctx, key).await {
                        Ok((data, written)) => {
                            if ctx.config().render.enabled {
                                if let StageData::Table(table) = &data {
                                    for chart in spec.runner.charts(&data) {
                                        render_logged(ctx.renderer(), &chart, table);
                                    }
                                }
                            }
                            live.insert(name.clone(), Arc::new(data));
                            ctx.events()
                                .emit_event(&PipelineEvent::StageComputed {
                                    stage: name.clone(),
                                    key: key.to_string(),
                                    duration_ms: timer.elapsed_ms(),
                                    written,
                                })
                                .await;
                            if written {
                                StageOutcome::Computed
                            } else {
                                StageOutcome::ComputedAlreadyPresent
                            }
                        }
                        Err(e) => {
                            StageSpanAttributes::new(name.clone(), key.as_str(), mark)
                                .with_duration_ms(timer.elapsed_ms())
                                .with_error(e.to_string())
                                .record();
                            ctx.events()
                                .emit_event(&PipelineEvent::StageFailed {
                                    stage: name.clone(),
                                    key: key.to_string(),
                                    error: e.to_string(),
                                })
                                .await;
                            return Err(e.in_stage(name, key.as_str()));
                        }
                    }
                }
            };

            let duration_ms = timer.finish();
            StageSpanAttributes::new(name.clone(), key.as_str(), mark)
                .with_outcome(outcome)
                .with_duration_ms(duration_ms)
                .record();
            report.durations_ms.insert(name.clone(), duration_ms);
            report.outcomes.push((name.clone(), outcome));

            if mark == StageMark::MustRun {
                for dep in &spec.dependencies {
                    if let Some(count) = pending.get_mut(dep.as_str()) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            self.release(&mut live, &mut report, dep);
                        }
                    }
                }
            }
            if pending.get(name.as_str()).copied().unwrap_or(0) == 0 {
                self.release(&mut live, &mut report, name);
            }
            if Some(index) == last_raw_reader {
                ctx.release_raw();
            }
        }

        Ok(report)
    }

    /// Runs one stage's compute function off the async runtime and publishes
    /// the result. Returns the output and whether a new artifact was written.
    async fn compute(
        &self,
        runner: Arc<dyn crate::stages::Stage>,
        inputs: StageInputs,
        ctx: &Arc<RunContext>,
        key: &CacheKey,
    ) -> Result<(StageData, bool), CnaflowError> {
        let task_ctx = Arc::clone(ctx);
        let stage_name = runner.name().to_string();
        let data = tokio::task::spawn_blocking(move || runner.compute(&inputs, &task_ctx))
            .await
            .map_err(|e| CnaflowError::Internal(format!("compute task failed: {e}")))??;

        if !data.is_finite() {
            return Err(CnaflowError::transform(stage_name, "output contains non-finite values"));
        }

        let written = if ctx.config().use_cache {
            self.store.save(key, &data).await? == SaveOutcome::Written
        } else {
            self.store.replace(key, &data).await?;
            true
        };
        if !written {
            tracing::warn!(key = %key, "Artifact already present; kept the existing one");
        }
        Ok((data, written))
    }

    /// Drops a live output unless it is retained for the merge.
    fn release(&self, live: &mut HashMap<String, Arc<StageData>>, report: &mut ExecutionReport, stage: &str) {
        if let Some(data) = live.remove(stage) {
            if self.retain.contains(stage) {
                report.retained.insert(stage.to_string(), data);
            } else {
                tracing::trace!(stage, "Released stage output");
            }
        }
    }
}
