//! Stage trait and implementations.
//!
//! A stage is one node of the pipeline graph: a named, parameterized, pure
//! transform from its dependencies' outputs to one [`StageData`] value.

mod builtin;
mod inputs;

pub use builtin::{
    BinStage, CellCycleStage, CommunityStage, CoordStage, FilterStage, NormStage, PcaStage,
    QcStage, RmolStage, SmoothStage, TsneStage, UmapStage, ZwinsStage,
};
pub use inputs::{StageInput, StageInputs};

use crate::cache::KeySegment;
use crate::context::{RunConfig, RunContext};
use crate::core::StageData;
use crate::errors::CnaflowError;
use crate::render::Chart;
use std::fmt::Debug;

/// Trait for pipeline stages.
///
/// `compute` is synchronous and CPU-bound; the executor runs it off the
/// async runtime. It must not touch the artifact store.
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Returns this stage's contribution to its cache key: a fixed token plus
    /// every parameter that changes the output.
    fn key_segment(&self, config: &RunConfig) -> KeySegment;

    /// Computes the stage output from its inputs.
    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError>;

    /// Returns true if the stage reads raw inputs from the run context.
    fn reads_raw(&self) -> bool {
        false
    }

    /// Charts to render after the stage computes.
    fn charts(&self, _output: &StageData) -> Vec<Chart> {
        Vec::new()
    }
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageInputs, &RunContext) -> Result<StageData, CnaflowError> + Send + Sync,
{
    name: &'static str,
    segment: KeySegment,
    reads_raw: bool,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageInputs, &RunContext) -> Result<StageData, CnaflowError> + Send + Sync,
{
    /// Creates a new function-based stage whose key segment is its name.
    pub fn new(name: &'static str, func: F) -> Self {
        Self {
            name,
            segment: KeySegment::new(name),
            reads_raw: false,
            func,
        }
    }

    /// Uses a fixed key segment.
    #[must_use]
    pub fn with_segment(mut self, segment: KeySegment) -> Self {
        self.segment = segment;
        self
    }

    /// Declares that the function reads raw inputs.
    #[must_use]
    pub fn reading_raw(mut self) -> Self {
        self.reads_raw = true;
        self
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageInputs, &RunContext) -> Result<StageData, CnaflowError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("segment", &self.segment.render())
            .finish()
    }
}

impl<F> Stage for FnStage<F>
where
    F: Fn(&StageInputs, &RunContext) -> Result<StageData, CnaflowError> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn key_segment(&self, _config: &RunConfig) -> KeySegment {
        self.segment.clone()
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        (self.func)(inputs, ctx)
    }

    fn reads_raw(&self) -> bool {
        self.reads_raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreCells;

    #[test]
    fn test_fn_stage_segment_and_debug() {
        let stage = FnStage::new("probe", |_, _| Ok(StageData::CoreCells(CoreCells::new([]))))
            .with_segment(KeySegment::new("probe").param("v", 2_usize));

        assert_eq!(stage.name(), "probe");
        assert_eq!(stage.key_segment(&RunConfig::new("r")).render(), "probe.v2");
        assert!(!stage.reads_raw());
        assert!(format!("{stage:?}").contains("probe.v2"));
    }
}
