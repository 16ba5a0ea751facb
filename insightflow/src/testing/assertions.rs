//! Test assertions for workflow results.

use crate::core::{StageRole, StageStatus, WorkflowStatus};
use crate::pipeline::WorkflowResult;
use crate::stages::citations;
use std::collections::HashSet;

/// Asserts the workflow's terminal status.
pub fn assert_workflow_status(result: &WorkflowResult, expected: WorkflowStatus) {
    assert_eq!(
        result.status, expected,
        "Expected workflow status {:?}, got {:?} (error: {:?})",
        expected, result.status, result.error
    );
}

/// Asserts a stage's status.
pub fn assert_stage_status(result: &WorkflowResult, role: StageRole, expected: StageStatus) {
    let actual = result.context_snapshot.status(role);
    assert_eq!(
        actual, expected,
        "Expected {role} to be {expected:?}, got {actual:?}"
    );
}

/// Asserts log timestamps never go backwards.
pub fn assert_log_monotonic(result: &WorkflowResult) {
    for pair in result.log.windows(2) {
        assert!(
            pair[0].timestamp <= pair[1].timestamp,
            "Log went backwards: '{}' at {} then '{}' at {}",
            pair[0].action,
            pair[0].timestamp,
            pair[1].action,
            pair[1].timestamp
        );
    }
}

/// Asserts no stage ran more attempts than `max_attempts`.
pub fn assert_attempts_bounded(result: &WorkflowResult, max_attempts: u32) {
    for role in StageRole::ALL {
        let attempts = result.context_snapshot.attempts(role);
        assert!(
            attempts <= max_attempts,
            "{role} ran {attempts} attempts, limit is {max_attempts}"
        );
    }
}

/// Asserts every citation in the report and in each contribution refers to
/// a retrieved passage.
pub fn assert_report_grounded(result: &WorkflowResult) {
    let snapshot = &result.context_snapshot;
    let known: HashSet<String> = snapshot
        .all_passages()
        .into_iter()
        .map(|p| p.passage_id)
        .collect();

    for id in citations::parse_citations(&result.report) {
        assert!(known.contains(&id), "Report cites unknown passage '{id}'");
    }
    for role in StageRole::ALL {
        if let Some(contribution) = snapshot.contribution(role) {
            let retrieved: HashSet<&str> = snapshot
                .passages(role)
                .iter()
                .map(|p| p.passage_id.as_str())
                .collect();
            for id in &contribution.citations {
                assert!(
                    retrieved.contains(id.as_str()),
                    "{role} cites '{id}' which it did not retrieve"
                );
            }
        }
    }
}
