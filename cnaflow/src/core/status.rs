//! Resolver marks and per-stage execution outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the executor must do with a stage in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageMark {
    /// Cached and not needed by anything that executes.
    Skip,
    /// Cached, and a computing successor consumes it.
    MustLoad,
    /// Not cached (or always run); the stage computes.
    MustRun,
}

impl fmt::Display for StageMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::MustLoad => write!(f, "must-load"),
            Self::MustRun => write!(f, "must-run"),
        }
    }
}

impl StageMark {
    /// Returns true if the stage's output will be live in memory.
    #[must_use]
    pub fn is_needed(&self) -> bool {
        matches!(self, Self::MustLoad | Self::MustRun)
    }
}

/// What the executor actually did with a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Nothing was done.
    Skipped,
    /// The artifact was loaded from the store.
    Loaded,
    /// The stage computed and its artifact was published.
    Computed,
    /// The stage computed but an artifact under the key already existed.
    ComputedAlreadyPresent,
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Loaded => write!(f, "loaded"),
            Self::Computed => write!(f, "computed"),
            Self::ComputedAlreadyPresent => write!(f, "computed_already_present"),
        }
    }
}

impl StageOutcome {
    /// Returns true if the stage's compute function ran.
    #[must_use]
    pub fn computed(&self) -> bool {
        matches!(self, Self::Computed | Self::ComputedAlreadyPresent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mark_display() {
        assert_eq!(StageMark::Skip.to_string(), "skip");
        assert_eq!(StageMark::MustLoad.to_string(), "must-load");
        assert_eq!(StageMark::MustRun.to_string(), "must-run");
    }

    #[test]
    fn test_stage_mark_is_needed() {
        assert!(!StageMark::Skip.is_needed());
        assert!(StageMark::MustLoad.is_needed());
        assert!(StageMark::MustRun.is_needed());
    }

    #[test]
    fn test_stage_mark_serialize() {
        let json = serde_json::to_string(&StageMark::MustLoad).unwrap();
        assert_eq!(json, r#""must_load""#);
        let back: StageMark = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StageMark::MustLoad);
    }

    #[test]
    fn test_stage_outcome_computed() {
        assert!(StageOutcome::Computed.computed());
        assert!(StageOutcome::ComputedAlreadyPresent.computed());
        assert!(!StageOutcome::Loaded.computed());
    }
}
