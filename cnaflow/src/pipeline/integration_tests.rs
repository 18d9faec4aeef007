//! End-to-end runs of the full stage graph over a synthetic dataset.

use super::*;
use crate::cache::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
use crate::context::{CellCycleBranch, EmbeddingSelection, RunConfig};
use crate::core::{StageMark, StageOutcome};
use crate::errors::CnaflowError;
use crate::events::CollectingEventSink;
use crate::testing::{
    assert_all_marked, assert_marks, assert_outcomes, fixture_config, RecordingStore, SyntheticDataset,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

const SEED: u64 = 11;

fn dataset() -> SyntheticDataset {
    SyntheticDataset::generate(6, SEED)
}

fn pipeline(config: RunConfig, store: Arc<dyn ArtifactStore>, data: &SyntheticDataset) -> CnaPipeline {
    CnaPipeline::with_parts(config, store, Arc::new(data.source())).unwrap()
}

#[test]
fn test_keys_are_deterministic_and_ignore_unrelated_parameters() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    let base = fixture_config("run1", dir.path());

    let a = pipeline(base.clone(), Arc::clone(&store), &data);
    let b = pipeline(base.clone(), Arc::clone(&store), &data);
    assert_eq!(a.keys(), b.keys());

    let mut perplexity = base.clone();
    perplexity.embedding.perplexity = 4.0;
    let c = pipeline(perplexity, Arc::clone(&store), &data);
    for ((stage, left), (_, right)) in a.keys().into_iter().zip(c.keys()) {
        assert_eq!(left == right, stage != "tsne", "stage {stage}");
    }

    let d = pipeline(base.with_smoothing_window(5), store, &data);
    for ((stage, left), (_, right)) in a.keys().into_iter().zip(d.keys()) {
        let upstream = ["qc", "filter", "coord", "norm", "bin", "rmol", "zwins"].contains(&stage);
        assert_eq!(left == right, upstream, "stage {stage}");
    }
}

#[test]
fn test_keys_extend_along_the_main_chain() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let p = pipeline(fixture_config("run1", dir.path()), Arc::new(InMemoryArtifactStore::new()), &data);
    let keys = p.keys();

    for pair in keys.windows(2) {
        let ((_, parent), (child_stage, child)) = (pair[0], pair[1]);
        if MAIN_CHAIN.contains(&child_stage) {
            assert!(child.extends(parent), "{child} should extend {parent}");
        }
    }
    assert!(keys[0].1.as_str().starts_with("run1-qc."));
}

#[tokio::test]
async fn test_first_run_computes_everything_and_repeat_skips() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let store = Arc::new(RecordingStore::new(InMemoryArtifactStore::new()));
    let config = fixture_config("run1", dir.path());

    let first = pipeline(config.clone(), store.clone(), &data).run().await.unwrap();
    assert_all_marked(&first.resolution, StageMark::MustRun);
    assert_eq!(first.report.computed_count(), first.resolution.order().len());
    assert_eq!(first.table.cells(), data.kept_cells().as_slice());
    for column in ["total_counts", "n_genes", "mito_fraction", "community", "tsne_1", "tsne_2"] {
        assert!(first.table.column(column).is_some(), "missing column {column}");
    }
    assert_eq!(first.dropped.iter().map(|d| d.count()).sum::<usize>(), data.low_quality.len());
    assert!(first.output_path.ends_with("run1-cells.tsv"));
    assert!(first.output_path.exists());

    store.reset();
    let second = pipeline(config, store.clone(), &data).run().await.unwrap();
    assert_all_marked(&second.resolution, StageMark::Skip);
    assert_eq!(second.report.computed_count(), 0);
    assert_eq!(second.table, first.table);
    assert!(store.saves().is_empty());
}

#[tokio::test]
async fn test_smoothing_change_recomputes_from_smoothing_onward() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let store = Arc::new(RecordingStore::new(InMemoryArtifactStore::new()));
    let config = fixture_config("run1", dir.path());
    let first = pipeline(config.clone(), store.clone(), &data).run().await.unwrap();
    store.reset();

    let changed = pipeline(config.with_smoothing_window(5), store.clone(), &data);
    let result = changed.run().await.unwrap();
    assert_marks(
        &result.resolution,
        &[
            ("qc", StageMark::Skip),
            ("filter", StageMark::Skip),
            ("coord", StageMark::Skip),
            ("norm", StageMark::Skip),
            ("bin", StageMark::Skip),
            ("rmol", StageMark::Skip),
            ("zwins", StageMark::MustLoad),
            ("smooth", StageMark::MustRun),
            ("pca", StageMark::MustRun),
            ("comm", StageMark::MustRun),
            ("tsne", StageMark::MustRun),
        ],
    );
    assert_eq!(result.report.computed(), vec!["smooth", "pca", "comm", "tsne"]);
    assert_eq!(store.loads()[0], first.resolution.key("zwins").unwrap().clone());
    assert_eq!(result.table.cells(), first.table.cells());
}

#[tokio::test]
async fn test_smoothing_change_leaves_cell_cycle_branch_cached() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let store = Arc::new(RecordingStore::new(InMemoryArtifactStore::new()));
    let config = fixture_config("run1", dir.path()).with_cell_cycle(CellCycleBranch::Detect { sd_threshold: 1.5 });
    let first = pipeline(config.clone(), store.clone(), &data).run().await.unwrap();

    let core_cells = std::fs::read_to_string(dir.path().join("out").join("run1-core-cells.txt")).unwrap();
    for cell in &data.cycling {
        assert!(!core_cells.lines().any(|line| line == cell), "{cell} is cycling");
    }
    store.reset();

    let moved = dir.path().join("out2");
    let result = pipeline(config.with_smoothing_window(5).with_output_dir(moved.clone()), store.clone(), &data)
        .run()
        .await
        .unwrap();
    assert_eq!(result.resolution.key("cc"), first.resolution.key("cc"));
    assert!(!moved.join("run1-core-cells.txt").exists(), "core cells are exported on compute only");
    assert_outcomes(
        &result.report,
        &[
            ("qc", StageOutcome::Skipped),
            ("cc", StageOutcome::Loaded),
            ("smooth", StageOutcome::Computed),
            ("pca", StageOutcome::Computed),
        ],
    );
}

#[tokio::test]
async fn test_both_embeddings_merge_into_one_table() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let config = fixture_config("run1", dir.path()).with_embedding(EmbeddingSelection::Both);
    let events = Arc::new(CollectingEventSink::new());

    let result = pipeline(config, Arc::new(InMemoryArtifactStore::new()), &data)
        .with_events(events.clone())
        .run()
        .await
        .unwrap();
    for column in ["tsne_1", "tsne_2", "umap_1", "umap_2", "community"] {
        assert!(result.table.column(column).is_some(), "missing column {column}");
    }
    assert_eq!(result.table.len(), data.kept_cells().len());
    assert_eq!(events.stages_of("stage.computed"), result.resolution.order().to_vec());
    assert_eq!(events.events_of_type("merge.dropped_cells").len(), 1);
    assert_eq!(events.events_of_type("run.completed").len(), 1);
}

#[tokio::test]
async fn test_metadata_sharing_no_cells_is_an_empty_result() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let source = data
        .source()
        .with_metadata(SyntheticDataset::metadata_for(&["elsewhere-1".to_string(), "elsewhere-2".to_string()]));
    let store = Arc::new(InMemoryArtifactStore::new());

    let err = CnaPipeline::with_parts(fixture_config("run1", dir.path()), store.clone(), Arc::new(source))
        .unwrap()
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err.root(), CnaflowError::EmptyResult(_)));
    assert!(!store.is_empty());
}

#[tokio::test]
async fn test_metadata_columns_join_the_result() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let source = data.source().with_metadata(SyntheticDataset::metadata_for(&data.kept_cells()));

    let result = CnaPipeline::with_parts(
        fixture_config("run1", dir.path()),
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(source),
    )
    .unwrap()
    .run()
    .await
    .unwrap();
    assert!(result.table.column("batch").is_some());
}

#[test]
fn test_invalid_configuration_rejected_before_any_work() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let store = InMemoryArtifactStore::new();

    let err = CnaPipeline::with_parts(
        fixture_config("run1", dir.path()).with_smoothing_window(0),
        Arc::new(store.clone()),
        Arc::new(data.source()),
    )
    .unwrap_err();
    assert!(matches!(err, CnaflowError::InvalidConfiguration(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_failed_write_publishes_nothing_and_next_run_resumes() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let fs = FsArtifactStore::open(dir.path().join("cache")).await.unwrap();
    let store = Arc::new(RecordingStore::new(fs));
    store.fail_saves_containing("-smooth.");
    let config = fixture_config("run1", dir.path());

    let p = pipeline(config.clone(), store.clone(), &data);
    let smooth_key = p.keys().iter().find(|(s, _)| *s == "smooth").map(|(_, k)| (*k).clone()).unwrap();
    let err = p.run().await.unwrap_err();
    assert_eq!(err.stage(), Some("smooth"));
    assert!(!store.exists(&smooth_key).await.unwrap());
    store.reset();

    let resumed = pipeline(config, store.clone(), &data).run().await.unwrap();
    assert_marks(
        &resumed.resolution,
        &[("rmol", StageMark::Skip), ("zwins", StageMark::MustLoad), ("smooth", StageMark::MustRun)],
    );
    assert!(store.exists(&smooth_key).await.unwrap());
}

#[tokio::test]
async fn test_disabled_cache_recomputes_without_checking_the_store() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let store = Arc::new(RecordingStore::new(InMemoryArtifactStore::new()));
    let config = fixture_config("run1", dir.path());
    pipeline(config.clone(), store.clone(), &data).run().await.unwrap();
    store.reset();

    let result = pipeline(config.with_use_cache(false), store.clone(), &data).run().await.unwrap();
    assert_all_marked(&result.resolution, StageMark::MustRun);
    assert!(store.exists_checks().is_empty());
    assert_eq!(store.replaces().len(), result.resolution.order().len());
}

#[tokio::test]
async fn test_plan_touches_no_artifacts() {
    let dir = TempDir::new().unwrap();
    let data = dataset();
    let store = Arc::new(RecordingStore::new(InMemoryArtifactStore::new()));

    let resolution = pipeline(fixture_config("run1", dir.path()), store.clone(), &data).plan().await.unwrap();
    assert_all_marked(&resolution, StageMark::MustRun);
    assert!(store.loads().is_empty());
    assert!(store.saves().is_empty());
}
