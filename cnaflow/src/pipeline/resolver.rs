//! The need resolver.
//!
//! Marks every stage `skip`, `must-load` or `must-run` from cache-existence
//! checks alone, before any data moves. One backward pass in reverse
//! execution order suffices because every mark depends only on the stage's
//! own cache flag and its direct successors' marks.

use super::StageGraph;
use crate::cache::{ArtifactStore, CacheKey};
use crate::core::StageMark;
use crate::errors::CnaflowError;
use serde::Serialize;
use std::collections::HashMap;

/// The marks and keys of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    order: Vec<String>,
    marks: HashMap<String, StageMark>,
    keys: HashMap<String, CacheKey>,
    cached: HashMap<String, bool>,
}

impl Resolution {
    /// Returns the stages in execution order.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Returns a stage's mark.
    #[must_use]
    pub fn mark(&self, stage: &str) -> Option<StageMark> {
        self.marks.get(stage).copied()
    }

    /// Returns a stage's cache key.
    #[must_use]
    pub fn key(&self, stage: &str) -> Option<&CacheKey> {
        self.keys.get(stage)
    }

    /// Returns whether the stage's artifact existed when the run resolved.
    #[must_use]
    pub fn is_cached(&self, stage: &str) -> bool {
        self.cached.get(stage).copied().unwrap_or(false)
    }

    /// Returns `(stage, mark)` pairs in execution order.
    #[must_use]
    pub fn marks(&self) -> Vec<(&str, StageMark)> {
        self.order
            .iter()
            .filter_map(|s| self.mark(s).map(|m| (s.as_str(), m)))
            .collect()
    }

    /// Returns the stages carrying a mark, in execution order.
    #[must_use]
    pub fn stages_marked(&self, mark: StageMark) -> Vec<&str> {
        self.marks()
            .into_iter()
            .filter(|(_, m)| *m == mark)
            .map(|(s, _)| s)
            .collect()
    }

    /// Counts the stages carrying a mark.
    #[must_use]
    pub fn count(&self, mark: StageMark) -> usize {
        self.marks.values().filter(|m| **m == mark).count()
    }
}

/// Computes stage marks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeedResolver;

impl NeedResolver {
    /// Marks stages from per-stage cache flags. Stages absent from `cached`
    /// count as not cached.
    ///
    /// - `must-run`: not cached, or always-run.
    /// - `must-load`: cached, and some direct successor is `must-run`.
    /// - `skip`: everything else.
    ///
    /// A cached stage downstream of a `must-run` stage is trusted as it is.
    #[must_use]
    pub fn resolve_marks(graph: &StageGraph, cached: &HashMap<String, bool>) -> HashMap<String, StageMark> {
        let mut marks: HashMap<String, StageMark> = HashMap::with_capacity(graph.stage_count());
        for name in graph.execution_order().iter().rev() {
            let always_run = graph.spec(name).is_some_and(|s| s.always_run);
            let is_cached = cached.get(name).copied().unwrap_or(false);
            let mark = if !is_cached || always_run {
                StageMark::MustRun
            } else if graph
                .successors(name)
                .iter()
                .any(|s| marks.get(s) == Some(&StageMark::MustRun))
            {
                StageMark::MustLoad
            } else {
                StageMark::Skip
            };
            marks.insert(name.clone(), mark);
        }
        marks
    }

    /// Checks the store for every key and resolves marks.
    ///
    /// With `use_cache` off the store is not consulted and every stage
    /// must run.
    pub async fn resolve(
        graph: &StageGraph,
        keys: HashMap<String, CacheKey>,
        store: &dyn ArtifactStore,
        use_cache: bool,
    ) -> Result<Resolution, CnaflowError> {
        let mut cached = HashMap::with_capacity(keys.len());
        for name in graph.execution_order() {
            let key = keys.get(name).ok_or_else(|| {
                CnaflowError::Internal(format!("no cache key derived for stage '{name}'"))
            })?;
            let exists = use_cache && store.exists(key).await.map_err(|e| e.in_stage(name, key.as_str()))?;
            cached.insert(name.clone(), exists);
        }

        let marks = Self::resolve_marks(graph, &cached);
        let resolution = Resolution {
            order: graph.execution_order().to_vec(),
            marks,
            keys,
            cached,
        };
        tracing::info!(
            must_run = resolution.count(StageMark::MustRun),
            must_load = resolution.count(StageMark::MustLoad),
            skip = resolution.count(StageMark::Skip),
            "Resolved stage marks"
        );
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKeyBuilder, MockArtifactStore};
    use crate::context::RunConfig;
    use crate::core::{CoreCells, StageData};
    use crate::pipeline::{PipelineBuilder, StageSpec};
    use crate::stages::{FnStage, Stage};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn stage(name: &'static str) -> Arc<dyn Stage> {
        Arc::new(FnStage::new(name, |_, _| Ok(StageData::CoreCells(CoreCells::new([])))))
    }

    /// a -> b -> c -> {d, e}
    fn fan_out() -> StageGraph {
        PipelineBuilder::new("t")
            .stage(stage("a"), &[])
            .unwrap()
            .stage(stage("b"), &["a"])
            .unwrap()
            .stage(stage("c"), &["b"])
            .unwrap()
            .stage(stage("d"), &["c"])
            .unwrap()
            .stage(stage("e"), &["c"])
            .unwrap()
            .build()
            .unwrap()
    }

    fn cached(flags: &[(&str, bool)]) -> HashMap<String, bool> {
        flags.iter().map(|(s, c)| ((*s).to_string(), *c)).collect()
    }

    fn marks_of(graph: &StageGraph, flags: &[(&str, bool)]) -> Vec<StageMark> {
        let marks = NeedResolver::resolve_marks(graph, &cached(flags));
        graph.execution_order().iter().map(|s| marks[s]).collect()
    }

    use StageMark::{MustLoad as L, MustRun as R, Skip as S};

    #[test]
    fn test_nothing_cached_everything_runs() {
        assert_eq!(marks_of(&fan_out(), &[]), vec![R, R, R, R, R]);
    }

    #[test]
    fn test_everything_cached_everything_skips() {
        let flags = [("a", true), ("b", true), ("c", true), ("d", true), ("e", true)];
        assert_eq!(marks_of(&fan_out(), &flags), vec![S, S, S, S, S]);
    }

    #[test]
    fn test_only_boundary_stage_loads() {
        let flags = [("a", true), ("b", true), ("c", true), ("d", true), ("e", false)];
        assert_eq!(marks_of(&fan_out(), &flags), vec![S, S, L, S, R]);
    }

    #[test]
    fn test_mid_chain_invalidation() {
        let flags = [("a", true), ("b", true), ("c", false), ("d", false), ("e", false)];
        assert_eq!(marks_of(&fan_out(), &flags), vec![S, L, R, R, R]);
    }

    #[test]
    fn test_cached_descendant_of_missing_stage_is_trusted() {
        let flags = [("a", true), ("b", false), ("c", true), ("d", true), ("e", true)];
        assert_eq!(marks_of(&fan_out(), &flags), vec![L, R, S, S, S]);
    }

    #[test]
    fn test_every_cache_combination_marks_consistently() {
        let graph = fan_out();
        let order = graph.execution_order();
        for bits in 0..(1u32 << order.len()) {
            let cached: HashMap<String, bool> = order
                .iter()
                .enumerate()
                .map(|(i, s)| (s.clone(), bits & (1 << i) != 0))
                .collect();
            let marks = NeedResolver::resolve_marks(&graph, &cached);

            for stage in order {
                let feeds_run = graph.successors(stage).iter().any(|s| marks[s] == R);
                match marks[stage] {
                    L => assert!(cached[stage] && feeds_run, "{stage} loaded needlessly, bits {bits:05b}"),
                    S => assert!(cached[stage] && !feeds_run, "{stage} skipped wrongly, bits {bits:05b}"),
                    R => assert!(!cached[stage], "{stage} recomputed while cached, bits {bits:05b}"),
                }
            }
        }
    }

    #[test]
    fn test_always_run_stage_pulls_its_input() {
        let mut builder = PipelineBuilder::new("t").stage(stage("a"), &[]).unwrap();
        builder
            .add_stage_spec(StageSpec::new(stage("b")).with_dependency("a").always_run())
            .unwrap();
        let graph = builder.build().unwrap();

        assert_eq!(marks_of(&graph, &[("a", true), ("b", true)]), vec![L, R]);
    }

    #[tokio::test]
    async fn test_resolve_only_checks_existence() {
        let graph = fan_out();
        let keys = graph.cache_keys(&CacheKeyBuilder::new("p"), &RunConfig::new("p"));
        let cached_key = keys["a"].clone();

        let mut store = MockArtifactStore::new();
        store
            .expect_exists()
            .times(5)
            .returning(move |k| Ok(*k == cached_key));
        store.expect_load().never();
        store.expect_save().never();

        let resolution = NeedResolver::resolve(&graph, keys, &store, true).await.unwrap();
        assert_eq!(resolution.mark("a"), Some(StageMark::MustLoad));
        assert!(resolution.is_cached("a"));
        assert_eq!(resolution.stages_marked(StageMark::MustRun), vec!["b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_resolve_without_cache_never_touches_store() {
        let graph = fan_out();
        let keys = graph.cache_keys(&CacheKeyBuilder::new("p"), &RunConfig::new("p"));
        let mut store = MockArtifactStore::new();
        store.expect_exists().never();

        let resolution = NeedResolver::resolve(&graph, keys, &store, false).await.unwrap();
        assert_eq!(resolution.count(StageMark::MustRun), 5);
    }
}
