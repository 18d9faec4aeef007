//! Test assertions for resolutions and execution reports.

use crate::core::{StageMark, StageOutcome};
use crate::pipeline::{ExecutionReport, Resolution};

/// Asserts the mark of each listed stage.
pub fn assert_marks(resolution: &Resolution, expected: &[(&str, StageMark)]) {
    for (stage, mark) in expected {
        assert_eq!(
            resolution.mark(stage),
            Some(*mark),
            "Expected stage '{}' to be {:?}; marks: {:?}",
            stage,
            mark,
            resolution.marks()
        );
    }
}

/// Asserts that every stage carries the same mark.
pub fn assert_all_marked(resolution: &Resolution, mark: StageMark) {
    assert_eq!(
        resolution.count(mark),
        resolution.order().len(),
        "Expected every stage to be {:?}; marks: {:?}",
        mark,
        resolution.marks()
    );
}

/// Asserts the outcome of each listed stage.
pub fn assert_outcomes(report: &ExecutionReport, expected: &[(&str, StageOutcome)]) {
    for (stage, outcome) in expected {
        assert_eq!(
            report.outcome(stage),
            Some(*outcome),
            "Expected stage '{}' to be {:?}; outcomes: {:?}",
            stage,
            outcome,
            report.outcomes()
        );
    }
}
