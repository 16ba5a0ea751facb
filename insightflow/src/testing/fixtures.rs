//! Sample data and context builders for tests.

use crate::config::EngineConfig;
use crate::context::{ContextSnapshot, WorkflowContext};
use crate::core::{Passage, StageRole};
use crate::services::Generation;
use crate::stages::{build_contribution, citations, default_stages, StageSettings};

/// Short id prefix used for a role's sample passages.
#[must_use]
pub fn prefix(role: StageRole) -> &'static str {
    match role {
        StageRole::Researcher => "r",
        StageRole::Reviewer => "v",
        StageRole::Synthesizer => "s",
        StageRole::Questioner => "q",
        StageRole::Formatter => "f",
    }
}

/// A single passage with a predictable source.
#[must_use]
pub fn passage(id: &str, score: f64) -> Passage {
    Passage::new(
        id,
        format!("Evidence passage {id} discussing the research question."),
        format!("paper-{id}.pdf"),
        score,
    )
}

/// `count` passages with ids `{prefix}1..` and strictly decreasing scores.
#[must_use]
pub fn passages(prefix: &str, count: usize) -> Vec<Passage> {
    (1..=count)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let score = 0.95 - i as f64 * 0.05;
            passage(&format!("{prefix}{i}"), score)
        })
        .collect()
}

/// Default settings for a role.
#[must_use]
pub fn stage_settings(role: StageRole) -> StageSettings {
    StageSettings::from_config(&EngineConfig::default(), role)
}

/// Plausible role output citing up to two of `ids`. Without ids the text
/// carries no citations.
#[must_use]
pub fn canned_text(role: StageRole, ids: &[String]) -> String {
    let a = ids.first().map_or("none", String::as_str);
    let b = ids.get(1).map_or(a, String::as_str);

    let text = match role {
        StageRole::Researcher => format!(
            "## Key Findings\n\
             - Longer context windows improve retrieval accuracy [cite:{a}]\n\
             - Memory cost grows linearly with sparse attention [cite:{b}]\n\
             ## Methodologies\n\
             Benchmarks on three public corpora were used [cite:{a}]."
        ),
        StageRole::Reviewer => format!(
            "## Strengths\n\
             - Evaluation spans several corpora [cite:{a}]\n\
             ## Weaknesses\n\
             - Few strong baselines were compared [cite:{b}]\n\
             - Results rely on a single random seed"
        ),
        StageRole::Synthesizer => format!(
            "Key insight: evaluation breadth and robustness are closely linked [cite:{a}]\n\
             H1: Broader benchmarks predict robustness on unseen domains [cite:{b}]\n\
             H2: Sparse attention patterns transfer across domains [cite:{a}]"
        ),
        StageRole::Questioner => format!(
            "There is a gap in multilingual evaluation of these methods [cite:{a}]\n\
             - How does the approach behave at one million tokens? [cite:{b}]\n\
             - Which failure modes appear on code corpora?"
        ),
        StageRole::Formatter => format!(
            "## Executive Summary\n\
             The literature supports sparse attention for long inputs [cite:{a}].\n\n\
             ## Conclusions\n\
             Broader multilingual evaluation is the main open need [cite:{b}]."
        ),
    };

    if ids.is_empty() {
        citations::strip_citations(&text)
    } else {
        text
    }
}

/// Builds snapshots with stages already merged, for stage-level tests.
///
/// Stages must be added in sequence order.
#[derive(Debug)]
pub struct SnapshotBuilder {
    ctx: WorkflowContext,
}

impl SnapshotBuilder {
    /// Starts from an empty context.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            ctx: WorkflowContext::new(query, 3),
        }
    }

    /// Merges `text` as a completed stage over `passages`.
    #[must_use]
    pub fn completed(self, role: StageRole, passages: Vec<Passage>, text: &str) -> Self {
        self.merge(role, passages, Generation::grounded(text), false)
    }

    /// Merges `text` as a degraded, ungrounded stage over `passages`.
    #[must_use]
    pub fn degraded(self, role: StageRole, passages: Vec<Passage>, text: &str) -> Self {
        self.merge(role, passages, Generation::ungrounded(text), true)
    }

    /// Marks a stage failed without a contribution.
    #[must_use]
    pub fn failed(mut self, role: StageRole) -> Self {
        self.start(role);
        self.ctx
            .fail_stage(role)
            .unwrap_or_else(|e| panic!("cannot fail {role}: {e}"));
        self
    }

    /// Returns the underlying context.
    #[must_use]
    pub fn context(self) -> WorkflowContext {
        self.ctx
    }

    /// Returns a snapshot of the built context.
    #[must_use]
    pub fn build(self) -> ContextSnapshot {
        self.ctx.snapshot()
    }

    fn start(&mut self, role: StageRole) {
        self.ctx
            .begin_stage(role)
            .unwrap_or_else(|e| panic!("cannot begin {role}: {e}"));
        self.ctx
            .increment_attempt(role)
            .unwrap_or_else(|e| panic!("cannot count attempt for {role}: {e}"));
    }

    fn merge(
        mut self,
        role: StageRole,
        passages: Vec<Passage>,
        generation: Generation,
        degraded: bool,
    ) -> Self {
        self.start(role);
        let stages = default_stages();
        let stage = stages[role.index()].as_ref();
        let contribution =
            build_contribution(stage, &generation, &passages, &self.ctx.snapshot(), degraded);

        let merged = self.ctx.record_passages(role, passages).and_then(|()| {
            if degraded {
                self.ctx.degrade_stage(role, contribution)
            } else {
                self.ctx.complete_stage(role, contribution)
            }
        });
        merged.unwrap_or_else(|e| panic!("cannot merge {role}: {e}"));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;

    #[test]
    fn test_passages_have_unique_ids_and_descending_scores() {
        let list = passages("r", 3);
        assert_eq!(list[0].passage_id, "r1");
        assert!(list[0].score > list[2].score);
    }

    #[test]
    fn test_canned_text_without_ids_has_no_citations() {
        for role in StageRole::ALL {
            assert!(citations::parse_citations(&canned_text(role, &[])).is_empty());
            let cited = canned_text(role, &["x1".to_string()]);
            assert_eq!(citations::parse_citations(&cited), vec!["x1"]);
        }
    }

    #[test]
    fn test_snapshot_builder_merges_in_order() {
        let snapshot = SnapshotBuilder::new("q")
            .completed(StageRole::Researcher, passages("r", 1), "- a [cite:r1]")
            .failed(StageRole::Reviewer)
            .build();
        assert_eq!(snapshot.status(StageRole::Researcher), StageStatus::Completed);
        assert_eq!(snapshot.status(StageRole::Reviewer), StageStatus::Failed);
        assert_eq!(snapshot.contribution(StageRole::Researcher).unwrap().citations, vec!["r1"]);
    }
}
