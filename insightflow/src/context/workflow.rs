//! The mutable per-run workflow context.

use super::ContextSnapshot;
use crate::core::{
    Contribution, LogEntry, Passage, StageRole, StageStatus, Timestamp, WorkflowStatus,
};
use crate::errors::{ContextError, WorkflowErrorPayload};
use chrono::Utc;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Shared state of one workflow run.
///
/// Owned by the orchestrator for the duration of the run. Every mutation
/// goes through a method that checks the context invariants, so an invalid
/// sequence of updates is rejected with a [`ContextError`] instead of being
/// silently recorded:
///
/// - stage statuses only move `pending -> working -> terminal`;
/// - a stage starts only once its predecessor is terminal;
/// - passages are recorded before, and at most once with, a contribution;
/// - contributions exist only for completed or degraded stages;
/// - attempts never exceed the configured limit.
#[derive(Debug)]
pub struct WorkflowContext {
    run_id: Uuid,
    query: String,
    max_attempts: u32,
    retrieved_passages: BTreeMap<StageRole, Vec<Passage>>,
    contributions: BTreeMap<StageRole, Contribution>,
    status: BTreeMap<StageRole, StageStatus>,
    attempt_count: BTreeMap<StageRole, u32>,
    log: Vec<LogEntry>,
    error: Option<WorkflowErrorPayload>,
    workflow_status: WorkflowStatus,
    started_at: Timestamp,
    finished_at: Option<Timestamp>,
}

impl WorkflowContext {
    /// Creates a context for `query`, allowing `max_attempts` per stage.
    #[must_use]
    pub fn new(query: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query: query.into(),
            max_attempts,
            retrieved_passages: BTreeMap::new(),
            contributions: BTreeMap::new(),
            status: StageRole::ALL
                .iter()
                .map(|role| (*role, StageStatus::Pending))
                .collect(),
            attempt_count: StageRole::ALL.iter().map(|role| (*role, 0)).collect(),
            log: Vec::new(),
            error: None,
            workflow_status: WorkflowStatus::Initialized,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

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

    /// Current status of a stage.
    #[must_use]
    pub fn status(&self, role: StageRole) -> StageStatus {
        self.status.get(&role).copied().unwrap_or_default()
    }

    /// Attempts made by a stage so far.
    #[must_use]
    pub fn attempts(&self, role: StageRole) -> u32 {
        self.attempt_count.get(&role).copied().unwrap_or(0)
    }

    /// The workflow status.
    #[must_use]
    pub fn workflow_status(&self) -> WorkflowStatus {
        self.workflow_status
    }

    /// The log recorded so far.
    #[must_use]
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Share of stages that reached a terminal status, 0.0 to 100.0.
    #[must_use]
    pub fn progress(&self) -> f64 {
        let done = self.status.values().filter(|s| s.is_terminal()).count();
        done as f64 / StageRole::ALL.len() as f64 * 100.0
    }

    fn ensure_running(&self) -> Result<(), ContextError> {
        if self.workflow_status.is_terminal() {
            return Err(ContextError::WorkflowFinished(self.workflow_status));
        }
        Ok(())
    }

    fn transition(&mut self, role: StageRole, to: StageStatus) -> Result<(), ContextError> {
        let from = self.status(role);
        if !from.can_transition_to(to) {
            return Err(ContextError::InvalidTransition {
                stage: role,
                from,
                to,
            });
        }
        self.status.insert(role, to);
        Ok(())
    }

    /// Moves a stage to `working`.
    ///
    /// # Errors
    ///
    /// Fails if the predecessor is not terminal or the stage is not pending.
    pub fn begin_stage(&mut self, role: StageRole) -> Result<(), ContextError> {
        self.ensure_running()?;
        if let Some(predecessor) = role.predecessor() {
            let status = self.status(predecessor);
            if !status.is_terminal() {
                return Err(ContextError::PredecessorNotTerminal {
                    stage: role,
                    predecessor,
                    status,
                });
            }
        }
        self.transition(role, StageStatus::Working)?;
        if self.workflow_status == WorkflowStatus::Initialized {
            self.workflow_status = WorkflowStatus::Running;
        }
        Ok(())
    }

    /// Counts a new attempt and returns its 1-based number.
    ///
    /// # Errors
    ///
    /// Fails if the stage is not working or the attempt limit is reached.
    pub fn increment_attempt(&mut self, role: StageRole) -> Result<u32, ContextError> {
        let status = self.status(role);
        if status != StageStatus::Working {
            return Err(ContextError::InvalidTransition {
                stage: role,
                from: status,
                to: StageStatus::Working,
            });
        }
        let next = self.attempts(role) + 1;
        if next > self.max_attempts {
            return Err(ContextError::AttemptLimitExceeded {
                stage: role,
                limit: self.max_attempts,
            });
        }
        self.attempt_count.insert(role, next);
        Ok(next)
    }

    /// Records the passages a stage worked from.
    ///
    /// # Errors
    ///
    /// Fails if passages were already recorded for the stage.
    pub fn record_passages(
        &mut self,
        role: StageRole,
        passages: Vec<Passage>,
    ) -> Result<(), ContextError> {
        if self.retrieved_passages.contains_key(&role) {
            return Err(ContextError::PassagesConflict(role));
        }
        self.retrieved_passages.insert(role, passages);
        Ok(())
    }

    fn store_contribution(
        &mut self,
        role: StageRole,
        contribution: Contribution,
        to: StageStatus,
    ) -> Result<(), ContextError> {
        if !self.retrieved_passages.contains_key(&role) {
            return Err(ContextError::MissingPassages(role));
        }
        if self.contributions.contains_key(&role) || contribution.stage != role {
            return Err(ContextError::ContributionConflict(role));
        }
        self.transition(role, to)?;
        self.contributions.insert(role, contribution);
        Ok(())
    }

    /// Merges a validated contribution and marks the stage `completed`.
    ///
    /// # Errors
    ///
    /// Fails if passages are missing, a contribution exists, or the stage is
    /// not working.
    pub fn complete_stage(
        &mut self,
        role: StageRole,
        contribution: Contribution,
    ) -> Result<(), ContextError> {
        self.store_contribution(role, contribution, StageStatus::Completed)
    }

    /// Merges a partial contribution and marks the stage `degraded`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::complete_stage`].
    pub fn degrade_stage(
        &mut self,
        role: StageRole,
        contribution: Contribution,
    ) -> Result<(), ContextError> {
        self.store_contribution(role, contribution, StageStatus::Degraded)
    }

    /// Marks the stage `failed`; no contribution is kept.
    ///
    /// # Errors
    ///
    /// Fails if the stage is not working.
    pub fn fail_stage(&mut self, role: StageRole) -> Result<(), ContextError> {
        self.transition(role, StageStatus::Failed)
    }

    /// Appends a log entry.
    ///
    /// Timestamps are clamped so the log never goes backwards.
    pub fn append_log(&mut self, mut entry: LogEntry) -> &LogEntry {
        if let Some(last) = self.log.last() {
            if entry.timestamp < last.timestamp {
                entry.timestamp = last.timestamp;
            }
        }
        self.log.push(entry);
        &self.log[self.log.len() - 1]
    }

    /// Records the structured terminal error.
    pub fn set_error(&mut self, error: WorkflowErrorPayload) {
        self.error = Some(error);
    }

    /// Moves the workflow to a terminal status.
    ///
    /// # Errors
    ///
    /// Fails if `status` is not terminal or the workflow already finished.
    pub fn finish(&mut self, status: WorkflowStatus) -> Result<(), ContextError> {
        self.ensure_running()?;
        if !status.is_terminal() {
            return Err(ContextError::WorkflowFinished(status));
        }
        self.workflow_status = status;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Final status implied by the stage statuses.
    ///
    /// `succeeded` when every stage completed, `partially_succeeded` when the
    /// Formatter produced a report despite upstream problems, else `aborted`.
    #[must_use]
    pub fn derive_final_status(&self) -> WorkflowStatus {
        if StageRole::ALL
            .iter()
            .all(|role| self.status(*role) == StageStatus::Completed)
        {
            WorkflowStatus::Succeeded
        } else if self.status(StageRole::Formatter).has_contribution() {
            WorkflowStatus::PartiallySucceeded
        } else {
            WorkflowStatus::Aborted
        }
    }

    /// An immutable copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            run_id: self.run_id,
            query: self.query.clone(),
            retrieved_passages: self.retrieved_passages.clone(),
            contributions: self.contributions.clone(),
            status: self.status.clone(),
            attempt_count: self.attempt_count.clone(),
            log: self.log.clone(),
            error: self.error.clone(),
            workflow_status: self.workflow_status,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}
