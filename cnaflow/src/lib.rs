//! # Cnaflow
//!
//! A cached, dependency-aware pipeline that turns single-cell gene-expression
//! counts into a per-cell copy-number signal, clusters and 2-D embeddings.
//!
//! Cnaflow provides:
//!
//! - **Parameter-derived cache keys**: every stage output is addressed by the
//!   run prefix plus the parameters of the stage and all its ancestors
//! - **Need resolution**: before anything runs, each stage is marked skip,
//!   must-load or must-run from what the store already holds
//! - **Lean execution**: outputs are dropped as soon as no pending stage needs
//!   them, and raw inputs are released after the last stage reading them
//! - **Branch selection and merge**: optional cell-cycle and embedding
//!   branches, joined on cell identity into one result table
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cnaflow::prelude::*;
//!
//! let config = RunConfig::from_file("cnaflow.toml").await?;
//! let pipeline = CnaPipeline::from_config(config).await?;
//!
//! let result = pipeline.run().await?;
//! println!("{} cells written to {}", result.table.len(), result.output_path.display());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_precision_loss
)]

pub mod cache;
pub mod cancellation;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod io;
pub mod observability;
pub mod pipeline;
pub mod render;
pub mod stages;
pub mod testing;
pub mod transforms;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{
        ArtifactStore, CacheKey, CacheKeyBuilder, FsArtifactStore, InMemoryArtifactStore,
        KeySegment, SaveOutcome,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{
        CellCycleBranch, EmbeddingSelection, OutlierFilter, RunConfig, RunContext,
    };
    pub use crate::core::{
        CellTable, Column, CoreCells, ExpressionMatrix, GenomicMatrix, Reduction, StageData,
        StageMark, StageOutcome,
    };
    pub use crate::errors::{
        CnaflowError, CycleDetectedError, PipelineValidationError, UndeclaredDependencyError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::io::{FileSource, InMemorySource, RawSource};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        BranchSelector, CnaPipeline, ExecutionReport, NeedResolver, PipelineBuilder,
        PipelineResult, Resolution, StageExecutor, StageGraph,
    };
    pub use crate::stages::{FnStage, Stage, StageInputs};
}

pub use errors::CnaflowError;
