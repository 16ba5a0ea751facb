//! Immutable context snapshots.

use crate::core::{
    merge_passages, Contribution, LogEntry, Passage, StageRole, StageStatus, Timestamp,
    WorkflowStatus,
};
use crate::errors::WorkflowErrorPayload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A read-only copy of a [`WorkflowContext`](super::WorkflowContext).
///
/// Stages receive one per attempt and callers receive the final one in the
/// workflow result. It has no mutators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub(super) run_id: Uuid,
    pub(super) query: String,
    pub(super) retrieved_passages: BTreeMap<StageRole, Vec<Passage>>,
    pub(super) contributions: BTreeMap<StageRole, Contribution>,
    pub(super) status: BTreeMap<StageRole, StageStatus>,
    pub(super) attempt_count: BTreeMap<StageRole, u32>,
    pub(super) log: Vec<LogEntry>,
    pub(super) error: Option<WorkflowErrorPayload>,
    pub(super) workflow_status: WorkflowStatus,
    pub(super) started_at: Timestamp,
    pub(super) finished_at: Option<Timestamp>,
}

impl ContextSnapshot {
    /// The run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The research query.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Status of a stage.
    #[must_use]
    pub fn status(&self, role: StageRole) -> StageStatus {
        self.status.get(&role).copied().unwrap_or_default()
    }

    /// Attempts made by a stage.
    #[must_use]
    pub fn attempts(&self, role: StageRole) -> u32 {
        self.attempt_count.get(&role).copied().unwrap_or(0)
    }

    /// The contribution of a stage, if it completed or degraded.
    #[must_use]
    pub fn contribution(&self, role: StageRole) -> Option<&Contribution> {
        self.contributions.get(&role)
    }

    /// Passages recorded for a stage; empty if none were recorded.
    #[must_use]
    pub fn passages(&self, role: StageRole) -> &[Passage] {
        self.retrieved_passages
            .get(&role)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns true if passages were recorded for the stage.
    #[must_use]
    pub fn has_passages(&self, role: StageRole) -> bool {
        self.retrieved_passages.contains_key(&role)
    }

    /// Every recorded passage across stages, deduplicated.
    #[must_use]
    pub fn all_passages(&self) -> Vec<Passage> {
        merge_passages(self.retrieved_passages.values().cloned())
    }

    /// Upstream passages that `role`'s contribution cited, in citation order.
    #[must_use]
    pub fn cited_passages(&self, role: StageRole) -> Vec<Passage> {
        let Some(contribution) = self.contribution(role) else {
            return Vec::new();
        };
        let pool = self.passages(role);
        contribution
            .citations
            .iter()
            .filter_map(|id| pool.iter().find(|p| &p.passage_id == id).cloned())
            .collect()
    }

    /// All stage statuses in sequence order.
    #[must_use]
    pub fn statuses(&self) -> Vec<(StageRole, StageStatus)> {
        StageRole::ALL.iter().map(|r| (*r, self.status(*r))).collect()
    }

    /// The log.
    #[must_use]
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// The terminal error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&WorkflowErrorPayload> {
        self.error.as_ref()
    }

    /// The workflow status.
    #[must_use]
    pub fn workflow_status(&self) -> WorkflowStatus {
        self.workflow_status
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// When the run finished, if it did.
    #[must_use]
    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    /// Serializes the snapshot to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer error.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
