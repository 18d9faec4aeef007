//! Pipeline events.
//!
//! The executor and merger report what they do through an [`EventSink`]
//! carried on the run context.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde_json::json;

/// Something that happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The need resolver marked every stage.
    RunResolved {
        /// Run identifier.
        run_id: String,
        /// `(stage, mark)` pairs in execution order.
        marks: Vec<(String, String)>,
    },
    /// A stage was neither loaded nor computed.
    StageSkipped {
        /// Stage name.
        stage: String,
        /// Cache key.
        key: String,
    },
    /// A cached artifact was loaded.
    StageLoaded {
        /// Stage name.
        stage: String,
        /// Cache key.
        key: String,
        /// Load time.
        duration_ms: f64,
    },
    /// A stage computed.
    StageComputed {
        /// Stage name.
        stage: String,
        /// Cache key.
        key: String,
        /// Compute and save time.
        duration_ms: f64,
        /// False if an artifact already existed under the key.
        written: bool,
    },
    /// A stage failed; the run stops.
    StageFailed {
        /// Stage name.
        stage: String,
        /// Cache key.
        key: String,
        /// Error message.
        error: String,
    },
    /// The merge dropped cells missing from one side of a join.
    MergeDroppedCells {
        /// The table joined in.
        table: String,
        /// Number of cells dropped.
        count: usize,
    },
    /// The run finished.
    RunCompleted {
        /// Run identifier.
        run_id: String,
        /// Rows in the final table.
        rows: usize,
        /// Stages that computed.
        computed: usize,
        /// Stages that loaded.
        loaded: usize,
    },
}

impl PipelineEvent {
    /// Returns the dotted event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunResolved { .. } => "run.resolved",
            Self::StageSkipped { .. } => "stage.skipped",
            Self::StageLoaded { .. } => "stage.loaded",
            Self::StageComputed { .. } => "stage.computed",
            Self::StageFailed { .. } => "stage.failed",
            Self::MergeDroppedCells { .. } => "merge.dropped_cells",
            Self::RunCompleted { .. } => "run.completed",
        }
    }

    /// Returns the event payload.
    #[must_use]
    pub fn data(&self) -> serde_json::Value {
        match self {
            Self::RunResolved { run_id, marks } => json!({
                "run_id": run_id,
                "marks": marks.iter().map(|(s, m)| json!({"stage": s, "mark": m})).collect::<Vec<_>>(),
            }),
            Self::StageSkipped { stage, key } => json!({"stage": stage, "key": key}),
            Self::StageLoaded { stage, key, duration_ms } => {
                json!({"stage": stage, "key": key, "duration_ms": duration_ms})
            }
            Self::StageComputed { stage, key, duration_ms, written } => json!({
                "stage": stage,
                "key": key,
                "duration_ms": duration_ms,
                "written": written,
            }),
            Self::StageFailed { stage, key, error } => {
                json!({"stage": stage, "key": key, "error": error})
            }
            Self::MergeDroppedCells { table, count } => json!({"table": table, "count": count}),
            Self::RunCompleted { run_id, rows, computed, loaded } => json!({
                "run_id": run_id,
                "rows": rows,
                "computed": computed,
                "loaded": loaded,
            }),
        }
    }
}
