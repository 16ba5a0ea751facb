//! Synthesizer: combines findings and critique into insights and hypotheses.

use super::{
    carried_from_upstream, extract, follow_up_queries, prompts, require_query, QuerySpec, Stage,
    StageSettings, SubQuery,
};
use crate::context::ContextSnapshot;
use crate::core::{ContributionBody, Passage, StageRole, Synthesis};
use crate::errors::StageError;
use crate::services::{Generation, Prompt};
use async_trait::async_trait;

const FOLLOW_UPS: usize = 2;

/// Searches for future-work material around the critique's weaknesses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthesizerStage;

#[async_trait]
impl Stage for SynthesizerStage {
    fn role(&self) -> StageRole {
        StageRole::Synthesizer
    }

    fn prepare_query(
        &self,
        snapshot: &ContextSnapshot,
        settings: &StageSettings,
    ) -> Result<QuerySpec, StageError> {
        let query = require_query(snapshot)?;
        let mut sub_queries = vec![SubQuery::new(
            format!("hypotheses research questions future work {query}"),
            settings.top_k,
        )];
        if let Some(critique) = snapshot
            .contribution(StageRole::Reviewer)
            .and_then(|c| c.as_critique())
        {
            sub_queries.extend(follow_up_queries(query, &critique.weaknesses, FOLLOW_UPS, settings.top_k));
        }
        Ok(QuerySpec::new(sub_queries).with_carried(carried_from_upstream(snapshot, self.role())))
    }

    fn build_prompt(&self, passages: &[Passage], snapshot: &ContextSnapshot) -> Prompt {
        let analysis = snapshot
            .contribution(StageRole::Researcher)
            .and_then(|c| c.as_findings())
            .map(|f| f.analysis.clone())
            .unwrap_or_default();
        let critique = snapshot
            .contribution(StageRole::Reviewer)
            .and_then(|c| c.as_critique());

        let upstream = [
            ("RESEARCHER'S FINDINGS", analysis),
            (
                "REVIEWER'S CRITIQUE",
                critique.map(|c| c.critique.clone()).unwrap_or_default(),
            ),
            (
                "STRENGTHS IDENTIFIED",
                critique.map(|c| prompts::bullets(&c.strengths)).unwrap_or_default(),
            ),
            (
                "WEAKNESSES IDENTIFIED",
                critique.map(|c| prompts::bullets(&c.weaknesses)).unwrap_or_default(),
            ),
        ];
        let mut user = prompts::user_prompt(
            snapshot.query(),
            "Synthesize the following research analysis and critique",
            &upstream,
            passages,
        );
        user.push_str(
            "\nIdentify key insights and patterns, connect findings from different sources, \
             generate 3-5 testable hypotheses and explain the evidence for each.\n",
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
        ContributionBody::Synthesis(Synthesis {
            synthesis: generation.text.clone(),
            hypotheses: extract::hypotheses(&generation.text),
            insights: extract::insights(&generation.text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, stage_settings, SnapshotBuilder};

    #[test]
    fn test_prepare_query_uses_weaknesses() {
        let snapshot = SnapshotBuilder::new("q")
            .completed(StageRole::Researcher, fixtures::passages("r", 1), "- f [cite:r1]")
            .completed(
                StageRole::Reviewer,
                fixtures::passages("v", 1),
                "## Weaknesses\n- Small sample [cite:v1]",
            )
            .build();

        let spec = SynthesizerStage
            .prepare_query(&snapshot, &stage_settings(StageRole::Synthesizer))
            .unwrap();
        assert_eq!(spec.sub_queries[0].query, "hypotheses research questions future work q");
        assert_eq!(spec.sub_queries[1].query, "q Small sample");
        assert_eq!(spec.carried[0].passage_id, "v1");
    }

    #[test]
    fn test_carries_from_nearest_contributing_stage() {
        let snapshot = SnapshotBuilder::new("q")
            .completed(StageRole::Researcher, fixtures::passages("r", 2), "- f [cite:r2]")
            .failed(StageRole::Reviewer)
            .build();

        let spec = SynthesizerStage
            .prepare_query(&snapshot, &stage_settings(StageRole::Synthesizer))
            .unwrap();
        assert_eq!(spec.sub_queries.len(), 1);
        assert_eq!(spec.carried.len(), 1);
        assert_eq!(spec.carried[0].passage_id, "r2");
    }

    #[test]
    fn test_contribute_extracts_hypotheses_and_insights() {
        let snapshot = SnapshotBuilder::new("q").build();
        let text = "Key insight: scale and robustness move together [cite:p1]\nH1: More data improves robustness [cite:p1]";
        let ContributionBody::Synthesis(synthesis) =
            SynthesizerStage.contribute(&Generation::grounded(text), &[], &snapshot, false)
        else {
            panic!("expected synthesis");
        };
        assert_eq!(synthesis.hypotheses.len(), 1);
        assert_eq!(synthesis.insights.len(), 1);
    }
}
