//! Testing utilities for cnaflow pipelines.
//!
//! This module provides:
//! - Counting and failing stages
//! - A recording artifact store with write-failure injection
//! - A seeded synthetic dataset and a matching configuration
//! - Assertions over marks and outcomes

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_all_marked, assert_marks, assert_outcomes};
pub use fixtures::{fixture_config, tiny_source, SyntheticDataset};
pub use mocks::{CountingStage, FailingStage, RecordingStore};
