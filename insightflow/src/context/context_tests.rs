//! Comprehensive tests for context module.

#[cfg(test)]
mod tests {
    use crate::context::WorkflowContext;
    use crate::core::{
        Contribution, ContributionBody, Critique, Findings, LogEntry, Passage, StageRole,
        StageStatus, WorkflowStatus,
    };
    use crate::errors::{ContextError, WorkflowErrorPayload};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn findings() -> Contribution {
        Contribution {
            stage: StageRole::Researcher,
            ungrounded: false,
            citations: vec!["p1".into()],
            body: ContributionBody::Findings(Findings {
                analysis: "- a finding [cite:p1]".into(),
                findings: vec!["- a finding [cite:p1]".into()],
                num_sources: 1,
            }),
        }
    }

    fn critique() -> Contribution {
        Contribution {
            stage: StageRole::Reviewer,
            ungrounded: true,
            citations: vec![],
            body: ContributionBody::Critique(Critique {
                critique: "weak".into(),
                strengths: vec![],
                weaknesses: vec![],
            }),
        }
    }

    fn completed_researcher() -> WorkflowContext {
        let mut ctx = WorkflowContext::new("q", 3);
        ctx.begin_stage(StageRole::Researcher).unwrap();
        ctx.increment_attempt(StageRole::Researcher).unwrap();
        ctx.record_passages(
            StageRole::Researcher,
            vec![Passage::new("p1", "text", "doc.pdf", 0.9)],
        )
        .unwrap();
        ctx.complete_stage(StageRole::Researcher, findings()).unwrap();
        ctx
    }

    #[test]
    fn test_new_context_is_pending() {
        let ctx = WorkflowContext::new("transformers", 3);
        assert_eq!(ctx.query(), "transformers");
        assert_eq!(ctx.workflow_status(), WorkflowStatus::Initialized);
        for role in StageRole::ALL {
            assert_eq!(ctx.status(role), StageStatus::Pending);
            assert_eq!(ctx.attempts(role), 0);
        }
        assert!(ctx.progress().abs() < f64::EPSILON);
    }

    #[test]
    fn test_begin_stage_requires_terminal_predecessor() {
        let mut ctx = WorkflowContext::new("q", 3);
        let err = ctx.begin_stage(StageRole::Reviewer).unwrap_err();
        assert!(matches!(
            err,
            ContextError::PredecessorNotTerminal {
                predecessor: StageRole::Researcher,
                status: StageStatus::Pending,
                ..
            }
        ));

        ctx.begin_stage(StageRole::Researcher).unwrap();
        assert_eq!(ctx.workflow_status(), WorkflowStatus::Running);
        assert!(ctx.begin_stage(StageRole::Reviewer).is_err());
    }

    #[test]
    fn test_status_never_goes_backwards() {
        let mut ctx = completed_researcher();
        let err = ctx.begin_stage(StageRole::Researcher).unwrap_err();
        assert_eq!(
            err,
            ContextError::InvalidTransition {
                stage: StageRole::Researcher,
                from: StageStatus::Completed,
                to: StageStatus::Working,
            }
        );
        assert!(ctx.fail_stage(StageRole::Researcher).is_err());
    }

    #[test]
    fn test_contribution_requires_passages_first() {
        let mut ctx = WorkflowContext::new("q", 3);
        ctx.begin_stage(StageRole::Researcher).unwrap();
        let err = ctx.complete_stage(StageRole::Researcher, findings()).unwrap_err();
        assert_eq!(err, ContextError::MissingPassages(StageRole::Researcher));
        assert_eq!(ctx.status(StageRole::Researcher), StageStatus::Working);
    }

    #[test]
    fn test_passages_are_write_once() {
        let mut ctx = completed_researcher();
        let err = ctx
            .record_passages(StageRole::Researcher, vec![])
            .unwrap_err();
        assert_eq!(err, ContextError::PassagesConflict(StageRole::Researcher));
    }

    #[test]
    fn test_contribution_must_match_stage() {
        let mut ctx = completed_researcher();
        ctx.begin_stage(StageRole::Reviewer).unwrap();
        ctx.record_passages(StageRole::Reviewer, vec![]).unwrap();
        let err = ctx.complete_stage(StageRole::Reviewer, findings()).unwrap_err();
        assert_eq!(err, ContextError::ContributionConflict(StageRole::Reviewer));
    }

    #[test]
    fn test_degraded_stage_keeps_contribution() {
        let mut ctx = completed_researcher();
        ctx.begin_stage(StageRole::Reviewer).unwrap();
        ctx.record_passages(StageRole::Reviewer, vec![]).unwrap();
        ctx.degrade_stage(StageRole::Reviewer, critique()).unwrap();

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.status(StageRole::Reviewer), StageStatus::Degraded);
        assert!(snapshot.contribution(StageRole::Reviewer).unwrap().ungrounded);
    }

    #[test]
    fn test_failed_stage_has_no_contribution() {
        let mut ctx = completed_researcher();
        ctx.begin_stage(StageRole::Reviewer).unwrap();
        ctx.fail_stage(StageRole::Reviewer).unwrap();

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.status(StageRole::Reviewer), StageStatus::Failed);
        assert!(snapshot.contribution(StageRole::Reviewer).is_none());
        // a failed predecessor still unblocks the next stage
        ctx.begin_stage(StageRole::Synthesizer).unwrap();
    }

    #[test]
    fn test_attempt_limit() {
        let mut ctx = WorkflowContext::new("q", 2);
        assert!(ctx.increment_attempt(StageRole::Researcher).is_err());

        ctx.begin_stage(StageRole::Researcher).unwrap();
        assert_eq!(ctx.increment_attempt(StageRole::Researcher).unwrap(), 1);
        assert_eq!(ctx.increment_attempt(StageRole::Researcher).unwrap(), 2);
        let err = ctx.increment_attempt(StageRole::Researcher).unwrap_err();
        assert_eq!(
            err,
            ContextError::AttemptLimitExceeded {
                stage: StageRole::Researcher,
                limit: 2,
            }
        );
        assert_eq!(ctx.attempts(StageRole::Researcher), 2);
    }

    #[test]
    fn test_log_timestamps_are_monotonic() {
        let mut ctx = WorkflowContext::new("q", 3);
        let first = LogEntry::workflow("workflow.started", "q");
        let mut earlier = LogEntry::workflow("workflow.note", "clock skew");
        earlier.timestamp = first.timestamp - Duration::seconds(5);

        ctx.append_log(first);
        let stored = ctx.append_log(earlier).timestamp;

        assert_eq!(stored, ctx.log()[0].timestamp);
        assert!(ctx.log().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_finish_and_derive_status() {
        let mut ctx = completed_researcher();
        assert_eq!(ctx.derive_final_status(), WorkflowStatus::Aborted);

        ctx.set_error(WorkflowErrorPayload::new("workflow_aborted", None, "stop"));
        ctx.finish(WorkflowStatus::Aborted).unwrap();
        assert!(ctx.begin_stage(StageRole::Reviewer).is_err());
        assert!(ctx.finish(WorkflowStatus::Succeeded).is_err());

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.error().unwrap().kind, "workflow_aborted");
        assert!(snapshot.finished_at().is_some());
    }

    #[test]
    fn test_finish_rejects_non_terminal_status() {
        let mut ctx = WorkflowContext::new("q", 3);
        assert!(ctx.finish(WorkflowStatus::Running).is_err());
    }

    #[test]
    fn test_progress_counts_terminal_stages() {
        let ctx = completed_researcher();
        assert!((ctx.progress() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_passage_helpers() {
        let ctx = completed_researcher();
        let snapshot = ctx.snapshot();

        assert!(snapshot.has_passages(StageRole::Researcher));
        assert!(snapshot.passages(StageRole::Reviewer).is_empty());
        assert_eq!(snapshot.all_passages().len(), 1);

        let cited = snapshot.cited_passages(StageRole::Researcher);
        assert_eq!(cited.len(), 1);
        assert_eq!(cited[0].passage_id, "p1");
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = completed_researcher().snapshot();
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"researcher\""));

        let back: crate::context::ContextSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
