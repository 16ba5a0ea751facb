//! Log entries and progress events emitted during a workflow run.

use super::{StageRole, StageStatus, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// UTC timestamp used across the crate.
pub type Timestamp = DateTime<Utc>;

/// An entry of the append-only workflow log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was recorded.
    pub timestamp: Timestamp,
    /// The stage concerned, or `None` for workflow-level entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageRole>,
    /// Dotted action name (e.g. "stage.started", "stage.attempt_failed").
    pub action: String,
    /// Free-form detail.
    pub detail: String,
}

impl LogEntry {
    /// Creates a stage-scoped entry stamped now.
    #[must_use]
    pub fn stage(stage: StageRole, action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stage: Some(stage),
            action: action.into(),
            detail: detail.into(),
        }
    }

    /// Creates a workflow-scoped entry stamped now.
    #[must_use]
    pub fn workflow(action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stage: None,
            action: action.into(),
            detail: detail.into(),
        }
    }

    /// Returns true if the entry concerns `stage` and has the given action.
    #[must_use]
    pub fn is(&self, stage: StageRole, action: &str) -> bool {
        self.stage == Some(stage) && self.action == action
    }
}

/// A progress event for live consumers such as a UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The workflow run.
    pub run_id: Uuid,
    /// The stage concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageRole>,
    /// The stage's status at emission time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StageStatus>,
    /// The workflow's status at emission time.
    pub workflow_status: WorkflowStatus,
    /// When the event was emitted.
    pub timestamp: Timestamp,
    /// Dotted action name, mirrors the log entry.
    pub action: String,
    /// Free-form detail, mirrors the log entry.
    pub detail: String,
    /// Percentage of stages in a terminal status, 0.0 to 100.0.
    pub progress: f64,
}

impl ProgressEvent {
    /// Builds an event mirroring a log entry.
    #[must_use]
    pub fn from_entry(
        run_id: Uuid,
        entry: &LogEntry,
        status: Option<StageStatus>,
        workflow_status: WorkflowStatus,
        progress: f64,
    ) -> Self {
        Self {
            run_id,
            stage: entry.stage,
            status,
            workflow_status,
            timestamp: entry.timestamp,
            action: entry.action.clone(),
            detail: entry.detail.clone(),
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_constructors() {
        let entry = LogEntry::stage(StageRole::Reviewer, "stage.started", "attempt 1");
        assert!(entry.is(StageRole::Reviewer, "stage.started"));
        assert!(!entry.is(StageRole::Researcher, "stage.started"));

        let entry = LogEntry::workflow("workflow.started", "q");
        assert!(entry.stage.is_none());
    }

    #[test]
    fn test_progress_event_mirrors_entry() {
        let entry = LogEntry::stage(StageRole::Researcher, "stage.completed", "3 passages");
        let run_id = Uuid::new_v4();
        let event = ProgressEvent::from_entry(
            run_id,
            &entry,
            Some(StageStatus::Completed),
            WorkflowStatus::Running,
            20.0,
        );

        assert_eq!(event.run_id, run_id);
        assert_eq!(event.stage, Some(StageRole::Researcher));
        assert_eq!(event.action, "stage.completed");
        assert!((event.progress - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = LogEntry::workflow("workflow.finished", "succeeded");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("\"stage\""));
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
