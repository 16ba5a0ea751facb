//! Questioner: identifies research gaps and follow-up questions.

use super::{
    carried_from_upstream, extract, follow_up_queries, prompts, require_query, QuerySpec, Stage,
    StageSettings, SubQuery,
};
use crate::context::ContextSnapshot;
use crate::core::{ContributionBody, GapAnalysis, Passage, StageRole};
use crate::errors::StageError;
use crate::services::{Generation, Prompt};
use async_trait::async_trait;

const FOLLOW_UPS: usize = 2;
const EXCERPT_CHARS: usize = 500;

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Searches for limitations and future work around the hypotheses.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionerStage;

#[async_trait]
impl Stage for QuestionerStage {
    fn role(&self) -> StageRole {
        StageRole::Questioner
    }

    fn prepare_query(
        &self,
        snapshot: &ContextSnapshot,
        settings: &StageSettings,
    ) -> Result<QuerySpec, StageError> {
        let query = require_query(snapshot)?;
        let mut sub_queries = vec![SubQuery::new(
            format!("research gaps limitations future work {query}"),
            settings.top_k,
        )];
        if let Some(synthesis) = snapshot
            .contribution(StageRole::Synthesizer)
            .and_then(|c| c.as_synthesis())
        {
            sub_queries.extend(follow_up_queries(query, &synthesis.hypotheses, FOLLOW_UPS, settings.top_k));
        }
        Ok(QuerySpec::new(sub_queries).with_carried(carried_from_upstream(snapshot, self.role())))
    }

    fn build_prompt(&self, passages: &[Passage], snapshot: &ContextSnapshot) -> Prompt {
        let synthesis = snapshot
            .contribution(StageRole::Synthesizer)
            .and_then(|c| c.as_synthesis());
        let analysis = snapshot
            .contribution(StageRole::Researcher)
            .and_then(|c| c.as_findings())
            .map(|f| excerpt(&f.analysis))
            .unwrap_or_default();
        let critique = snapshot
            .contribution(StageRole::Reviewer)
            .and_then(|c| c.as_critique())
            .map(|c| excerpt(&c.critique))
            .unwrap_or_default();

        let upstream = [
            (
                "SYNTHESIS AND HYPOTHESES",
                synthesis.map(|s| s.synthesis.clone()).unwrap_or_default(),
            ),
            (
                "HYPOTHESES GENERATED",
                synthesis.map(|s| prompts::bullets(&s.hypotheses)).unwrap_or_default(),
            ),
            (
                "KEY INSIGHTS",
                synthesis.map(|s| prompts::bullets(&s.insights)).unwrap_or_default(),
            ),
            ("RESEARCHER'S ANALYSIS", analysis),
            ("REVIEWER'S CRITIQUE", critique),
        ];
        let mut user = prompts::user_prompt(
            snapshot.query(),
            "Identify gaps and generate questions based on the following research analysis",
            &upstream,
            passages,
        );
        user.push_str(
            "\nIdentify knowledge gaps, unanswered questions, 5-7 critical follow-up \
             questions and research priorities for future work.\n",
        );
        Prompt {
            system: prompts::system_prompt(self.role()),
            user,
        }
    }

    fn contribute(
        &self,
        generation: &Generation,
        _passages: &[Passage],
        _snapshot: &ContextSnapshot,
        _ungrounded: bool,
    ) -> ContributionBody {
        ContributionBody::GapAnalysis(GapAnalysis {
            gap_analysis: generation.text.clone(),
            gaps: extract::gaps(&generation.text),
            questions: extract::questions(&generation.text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, stage_settings, SnapshotBuilder};

    #[test]
    fn test_prepare_query_uses_hypotheses() {
        let snapshot = SnapshotBuilder::new("q")
            .completed(StageRole::Researcher, fixtures::passages("r", 1), "- f [cite:r1]")
            .completed(StageRole::Reviewer, fixtures::passages("v", 1), "fine [cite:v1]")
            .completed(
                StageRole::Synthesizer,
                fixtures::passages("s", 1),
                "H1: Larger windows improve recall [cite:s1]",
            )
            .build();

        let spec = QuestionerStage
            .prepare_query(&snapshot, &stage_settings(StageRole::Questioner))
            .unwrap();
        assert_eq!(spec.sub_queries.len(), 2);
        assert_eq!(spec.sub_queries[0].top_k, 5);
        assert_eq!(spec.sub_queries[1].query, "q H1: Larger windows improve recall");
        assert_eq!(spec.carried[0].passage_id, "s1");
    }

    #[test]
    fn test_excerpt_is_char_safe() {
        let long = "é".repeat(600);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn test_contribute_extracts_gaps_and_questions() {
        let snapshot = SnapshotBuilder::new("q").build();
        let text = "There is a gap in multilingual evaluation [cite:p1]\nWhat happens at 1M tokens?";
        let ContributionBody::GapAnalysis(gaps) =
            QuestionerStage.contribute(&Generation::grounded(text), &[], &snapshot, false)
        else {
            panic!("expected gap analysis");
        };
        assert_eq!(gaps.gaps.len(), 1);
        assert_eq!(gaps.questions, vec!["What happens at 1M tokens?"]);
    }
}
