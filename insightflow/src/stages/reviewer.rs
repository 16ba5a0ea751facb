//! Reviewer: critiques the Researcher's findings.

use super::{
    carried_from_upstream, extract, follow_up_queries, prompts, require_query, QuerySpec, Stage,
    StageSettings, SubQuery,
};
use crate::context::ContextSnapshot;
use crate::core::{ContributionBody, Critique, Passage, StageRole};
use crate::errors::StageError;
use crate::services::{Generation, Prompt};
use async_trait::async_trait;

/// Follow-up sub-queries derived from upstream items.
const FOLLOW_UPS: usize = 2;

/// Looks for methodological evidence around the findings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewerStage;

#[async_trait]
impl Stage for ReviewerStage {
    fn role(&self) -> StageRole {
        StageRole::Reviewer
    }

    fn prepare_query(
        &self,
        snapshot: &ContextSnapshot,
        settings: &StageSettings,
    ) -> Result<QuerySpec, StageError> {
        let query = require_query(snapshot)?;
        let mut sub_queries = vec![SubQuery::new(
            format!("methodology limitations weaknesses {query}"),
            settings.top_k,
        )];
        if let Some(findings) = snapshot
            .contribution(StageRole::Researcher)
            .and_then(|c| c.as_findings())
        {
            sub_queries.extend(follow_up_queries(query, &findings.findings, FOLLOW_UPS, settings.top_k));
        }
        Ok(QuerySpec::new(sub_queries).with_carried(carried_from_upstream(snapshot, self.role())))
    }

    fn build_prompt(&self, passages: &[Passage], snapshot: &ContextSnapshot) -> Prompt {
        let findings = snapshot
            .contribution(StageRole::Researcher)
            .and_then(|c| c.as_findings());
        let upstream = [
            (
                "RESEARCHER'S ANALYSIS",
                findings.map(|f| f.analysis.clone()).unwrap_or_default(),
            ),
            (
                "KEY FINDINGS",
                findings.map(|f| prompts::bullets(&f.findings)).unwrap_or_default(),
            ),
        ];
        let mut user = prompts::user_prompt(
            snapshot.query(),
            "Review and critique the following research analysis",
            &upstream,
            passages,
        );
        user.push_str(
            "\nProvide a thorough critique focusing on strengths, weaknesses, \
             potential biases and gaps in the analysis.\n",
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
        ContributionBody::Critique(Critique {
            critique: generation.text.clone(),
            strengths: extract::section_items(&generation.text, "strengths"),
            weaknesses: extract::section_items(&generation.text, "weaknesses"),
        })
    }
}
