//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications and the validating graph builder
//! - The need resolver and the stage executor
//! - Branch selection and the final result merge
//! - The [`CnaPipeline`] facade tying them together

mod branch;
mod builder;
mod dag;
mod executor;
mod merge;
mod resolver;
mod runner;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use branch::{BranchSelector, MAIN_CHAIN};
pub use builder::PipelineBuilder;
pub use dag::StageGraph;
pub use executor::{ExecutionReport, StageExecutor};
pub use merge::{MergeReport, ResultMerger};
pub use resolver::{NeedResolver, Resolution};
pub use runner::{CnaPipeline, PipelineResult};
pub use spec::StageSpec;
