//! The stage contract and the five research stages.
//!
//! A stage never touches the workflow context directly: it reads an
//! immutable [`ContextSnapshot`] and returns values, and the orchestrator
//! merges them. One attempt runs
//! `prepare_query -> retrieve -> generate -> validate -> contribute`.

pub mod citations;
pub mod extract;
pub mod prompts;
mod retrieval;

mod formatter;
mod questioner;
mod researcher;
mod reviewer;
mod synthesizer;

pub use formatter::{FormatterStage, ReportAssembler};
pub use questioner::QuestionerStage;
pub use researcher::ResearcherStage;
pub use retrieval::retrieve_passages;
pub use reviewer::ReviewerStage;
pub use synthesizer::SynthesizerStage;

use crate::config::EngineConfig;
use crate::context::ContextSnapshot;
use crate::core::{Contribution, ContributionBody, Passage, StageRole};
use crate::errors::{GenerationError, GroundingViolation, StageError};
use crate::services::{Generation, GenerationRequest, GenerationService, Prompt, RetrievalService};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// The external services a stage may call.
#[derive(Clone)]
pub struct StagePorts {
    /// Corpus search.
    pub retrieval: Arc<dyn RetrievalService>,
    /// Text generation.
    pub generation: Arc<dyn GenerationService>,
}

impl Debug for StagePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePorts").finish_non_exhaustive()
    }
}

impl StagePorts {
    /// Creates new ports.
    #[must_use]
    pub fn new(
        retrieval: Arc<dyn RetrievalService>,
        generation: Arc<dyn GenerationService>,
    ) -> Self {
        Self {
            retrieval,
            generation,
        }
    }
}

/// Effective per-stage settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSettings {
    /// Model identifier.
    pub model: String,
    /// Generation temperature.
    pub temperature: f32,
    /// Passages per sub-query.
    pub top_k: usize,
    /// Token budget per generation.
    pub max_tokens: u32,
    /// Budget for one external call.
    pub per_call_timeout_ms: u64,
    /// Concurrent sub-queries.
    pub fan_out: usize,
}

impl StageSettings {
    /// Settings for `role` as configured, before per-run overrides.
    #[must_use]
    pub fn from_config(config: &EngineConfig, role: StageRole) -> Self {
        let tuning = config.tuning(role);
        Self {
            model: config.model.clone(),
            temperature: tuning.temperature,
            top_k: tuning.top_k,
            max_tokens: config.max_tokens,
            per_call_timeout_ms: config.per_call_timeout_ms,
            fan_out: config.fan_out,
        }
    }

    /// The per-call timeout as a duration.
    #[must_use]
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }
}

/// One retrieval sub-query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuery {
    /// Search text.
    pub query: String,
    /// Passages requested.
    pub top_k: usize,
}

impl SubQuery {
    /// Creates a sub-query.
    #[must_use]
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
        }
    }
}

/// What a stage wants retrieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Sub-queries sent to the retrieval service.
    pub sub_queries: Vec<SubQuery>,
    /// Upstream passages merged into the result without a service call.
    pub carried: Vec<Passage>,
}

impl QuerySpec {
    /// Creates a spec from sub-queries.
    #[must_use]
    pub fn new(sub_queries: Vec<SubQuery>) -> Self {
        Self {
            sub_queries,
            carried: Vec::new(),
        }
    }

    /// Sets the carried passages.
    #[must_use]
    pub fn with_carried(mut self, carried: Vec<Passage>) -> Self {
        self.carried = carried;
        self
    }
}

/// A research stage.
///
/// Implementors provide the role-specific parts (`prepare_query`,
/// `build_prompt`, `contribute`); retrieval, generation and validation have
/// shared default implementations.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// The role this stage plays.
    fn role(&self) -> StageRole;

    /// Derives the retrieval sub-queries and carried passages.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::MalformedContext`] when the snapshot cannot be
    /// worked with.
    fn prepare_query(
        &self,
        snapshot: &ContextSnapshot,
        settings: &StageSettings,
    ) -> Result<QuerySpec, StageError>;

    /// Retrieves and merges passages for the spec.
    async fn retrieve(
        &self,
        spec: &QuerySpec,
        ports: &StagePorts,
        settings: &StageSettings,
    ) -> Result<Vec<Passage>, StageError> {
        retrieve_passages(self.role(), spec, ports, settings).await
    }

    /// Builds the prompt for the generation call.
    fn build_prompt(&self, passages: &[Passage], snapshot: &ContextSnapshot) -> Prompt;

    /// Calls the generation service once, under the per-call timeout.
    async fn generate(
        &self,
        passages: &[Passage],
        snapshot: &ContextSnapshot,
        ports: &StagePorts,
        settings: &StageSettings,
    ) -> Result<Generation, StageError> {
        let request = GenerationRequest {
            stage: self.role(),
            model: settings.model.clone(),
            prompt: self.build_prompt(passages, snapshot),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };
        match tokio::time::timeout(settings.per_call_timeout(), ports.generation.generate(&request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GenerationError::Timeout {
                after_ms: settings.per_call_timeout_ms,
            }
            .into()),
        }
    }

    /// Checks that every citation refers to one of `passages`.
    fn validate(&self, generation: &Generation, passages: &[Passage]) -> Result<(), GroundingViolation> {
        citations::validate_grounding(self.role(), generation, passages)
    }

    /// Turns accepted generation output into the role's structured body.
    fn contribute(
        &self,
        generation: &Generation,
        passages: &[Passage],
        snapshot: &ContextSnapshot,
        ungrounded: bool,
    ) -> ContributionBody;
}

/// Wraps a body into a [`Contribution`], recording its citations.
#[must_use]
pub fn build_contribution(
    stage: &dyn Stage,
    generation: &Generation,
    passages: &[Passage],
    snapshot: &ContextSnapshot,
    ungrounded: bool,
) -> Contribution {
    let body = stage.contribute(generation, passages, snapshot, ungrounded);
    Contribution {
        stage: stage.role(),
        ungrounded,
        citations: citations::parse_citations(&generation.text),
        body,
    }
}

/// Keeps only citations that refer to `passages`, for partial results.
#[must_use]
pub fn sanitize_generation(generation: &Generation, passages: &[Passage]) -> Generation {
    let known: HashSet<&str> = passages.iter().map(|p| p.passage_id.as_str()).collect();
    Generation {
        text: citations::retain_citations(&generation.text, &known),
        grounded: false,
    }
}

/// The built-in stages in execution order.
#[must_use]
pub fn default_stages() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(ResearcherStage),
        Arc::new(ReviewerStage),
        Arc::new(SynthesizerStage),
        Arc::new(QuestionerStage),
        Arc::new(FormatterStage),
    ]
}

/// Rejects a snapshot whose query is blank.
pub(crate) fn require_query(snapshot: &ContextSnapshot) -> Result<&str, StageError> {
    let query = snapshot.query().trim();
    if query.is_empty() {
        return Err(StageError::MalformedContext(
            "research query is empty".to_string(),
        ));
    }
    Ok(query)
}

/// Passages cited by the nearest upstream stage that left a contribution.
pub(crate) fn carried_from_upstream(snapshot: &ContextSnapshot, role: StageRole) -> Vec<Passage> {
    let mut current = role.predecessor();
    while let Some(upstream) = current {
        if snapshot.contribution(upstream).is_some() {
            return snapshot.cited_passages(upstream);
        }
        current = upstream.predecessor();
    }
    Vec::new()
}

/// Reuses up to `limit` items as extra sub-queries, prefixed with the query.
pub(crate) fn follow_up_queries(
    query: &str,
    items: &[String],
    limit: usize,
    top_k: usize,
) -> Vec<SubQuery> {
    items
        .iter()
        .map(|item| extract::plain_item(item))
        .filter(|item| !item.is_empty())
        .take(limit)
        .map(|item| SubQuery::new(format!("{query} {item}"), top_k))
        .collect()
}
