//! The value returned for every run.

use crate::context::ContextSnapshot;
use crate::core::{LogEntry, Report, StageRole, WorkflowStatus};
use crate::errors::{InsightflowError, WorkflowAborted, WorkflowErrorPayload};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Outcome of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Terminal workflow status.
    pub status: WorkflowStatus,
    /// Rendered markdown report; empty when the run aborted.
    pub report: String,
    /// Final state of the run.
    pub context_snapshot: ContextSnapshot,
    /// The run log.
    pub log: Vec<LogEntry>,
    /// Structured terminal error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkflowErrorPayload>,
}

impl WorkflowResult {
    pub(crate) fn from_snapshot(snapshot: ContextSnapshot) -> Self {
        let status = snapshot.workflow_status();
        let report = if status == WorkflowStatus::Aborted {
            String::new()
        } else {
            snapshot
                .contribution(StageRole::Formatter)
                .and_then(|c| c.as_report())
                .map(Report::render)
                .unwrap_or_default()
        };
        Self {
            status,
            report,
            log: snapshot.log().to_vec(),
            error: snapshot.error().cloned(),
            context_snapshot: snapshot,
        }
    }

    /// Returns true if a report was produced.
    #[must_use]
    pub fn has_report(&self) -> bool {
        !self.report.is_empty()
    }

    /// The structured report, if the Formatter produced one.
    #[must_use]
    pub fn report_model(&self) -> Option<&Report> {
        self.context_snapshot
            .contribution(StageRole::Formatter)
            .and_then(|c| c.as_report())
    }

    /// Per-stage status table.
    #[must_use]
    pub fn summary(&self) -> String {
        let snapshot = &self.context_snapshot;
        let mut out = String::new();
        let _ = writeln!(out, "Workflow {} ({})", snapshot.run_id(), self.status);
        let _ = writeln!(out, "Query: {}", snapshot.query());
        for (role, status) in snapshot.statuses() {
            let _ = write!(
                out,
                "  {:<12} {:<10} attempts={}",
                role.label(),
                status.to_string(),
                snapshot.attempts(role)
            );
            if let Some(contribution) = snapshot.contribution(role) {
                let detail = match role {
                    StageRole::Researcher => contribution
                        .as_findings()
                        .map(|f| format!("{} sources", f.num_sources)),
                    StageRole::Synthesizer => contribution
                        .as_synthesis()
                        .map(|s| format!("{} hypotheses", s.hypotheses.len())),
                    StageRole::Questioner => contribution
                        .as_gap_analysis()
                        .map(|g| format!("{} questions", g.questions.len())),
                    StageRole::Reviewer | StageRole::Formatter => None,
                };
                if let Some(detail) = detail {
                    let _ = write!(out, " {detail}");
                }
            }
            out.push('\n');
        }
        if let Some(error) = &self.error {
            let _ = writeln!(out, "Error [{}]: {}", error.kind, error.message);
        }
        out.trim_end().to_string()
    }

    /// Writes the report to `path`.
    ///
    /// Refuses to write for an aborted run.
    pub fn save_report(&self, path: impl AsRef<Path>) -> Result<(), InsightflowError> {
        if self.status == WorkflowStatus::Aborted || !self.has_report() {
            let stage = self.error.as_ref().and_then(|e| e.stage);
            let cancelled = self.error.as_ref().is_some_and(|e| e.kind == "cancelled");
            return Err(WorkflowAborted {
                stage,
                cancelled,
                reason: "no report was produced".to_string(),
            }
            .into());
        }

        let snapshot = &self.context_snapshot;
        let mut content = self.report.clone();
        let _ = write!(content, "\n\n---\n_Run {}", snapshot.run_id());
        if let Some(finished) = snapshot.finished_at() {
            let _ = write!(content, ", generated {}", finished.to_rfc3339());
        }
        content.push_str("_\n");

        std::fs::write(path.as_ref(), content)?;
        tracing::info!(path = %path.as_ref().display(), "Report saved");
        Ok(())
    }

    /// Serializes the result to pretty JSON.
    pub fn to_json(&self) -> Result<String, InsightflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
