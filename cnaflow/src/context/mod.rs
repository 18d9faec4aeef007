//! Run configuration and per-run context.

mod config;
mod run;

pub use config::{
    BinningConfig, CellCycleBranch, CommunityConfig, EmbeddingConfig, EmbeddingSelection,
    FilterConfig, InputConfig, OutlierFilter, PcaConfig, QcConfig, RenderConfig, RunConfig,
    SmoothingConfig, ZScoreConfig,
};
pub use run::RunContext;
