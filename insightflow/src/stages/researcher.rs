//! Researcher: analyzes the corpus and extracts key findings.

use super::{extract, prompts, require_query, QuerySpec, Stage, StageSettings, SubQuery};
use crate::context::ContextSnapshot;
use crate::core::{ContributionBody, Findings, Passage, StageRole};
use crate::errors::StageError;
use crate::services::{Generation, Prompt};
use async_trait::async_trait;

/// The first stage. Searches the corpus with the research query itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResearcherStage;

#[async_trait]
impl Stage for ResearcherStage {
    fn role(&self) -> StageRole {
        StageRole::Researcher
    }

    fn prepare_query(
        &self,
        snapshot: &ContextSnapshot,
        settings: &StageSettings,
    ) -> Result<QuerySpec, StageError> {
        let query = require_query(snapshot)?;
        Ok(QuerySpec::new(vec![SubQuery::new(query, settings.top_k)]))
    }

    fn build_prompt(&self, passages: &[Passage], snapshot: &ContextSnapshot) -> Prompt {
        let mut user = prompts::user_prompt(
            snapshot.query(),
            "Analyze the following research papers",
            &[],
            passages,
        );
        user.push_str(
            "\nProvide a detailed analysis with:\n\
             1. Key findings from the papers (one bullet per finding)\n\
             2. Methodologies used\n\
             3. Main conclusions\n\
             4. Any limitations or gaps mentioned\n",
        );
        Prompt {
            system: prompts::system_prompt(self.role()),
            user,
        }
    }

    fn contribute(
        &self,
        generation: &Generation,
        passages: &[Passage],
        _snapshot: &ContextSnapshot,
        _ungrounded: bool,
    ) -> ContributionBody {
        ContributionBody::Findings(Findings {
            analysis: generation.text.clone(),
            findings: extract::findings(&generation.text),
            num_sources: passages.len(),
        })
    }
}
