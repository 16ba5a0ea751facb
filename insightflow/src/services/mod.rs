//! External service contracts.
//!
//! The engine reaches the document corpus and the language model only
//! through these two traits. Implementations must be safe to share across
//! concurrent workflow runs.

#[cfg(feature = "http")]
pub mod http;

use crate::core::{Passage, StageRole};
use crate::errors::{GenerationError, RetrievalError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Filters applied to a retrieval call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// The stage issuing the search.
    pub stage: StageRole,
    /// Maximum passages to return.
    pub top_k: usize,
}

impl SearchFilters {
    /// Creates new filters.
    #[must_use]
    pub fn new(stage: StageRole, top_k: usize) -> Self {
        Self { stage, top_k }
    }
}

/// Semantic search over the document corpus.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RetrievalService: Send + Sync {
    /// Returns passages relevant to `query`.
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<Passage>, RetrievalError>;
}

/// A system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Role instructions.
    pub system: String,
    /// Task with the numbered context passages.
    pub user: String,
}

/// A request to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The stage issuing the request.
    pub stage: StageRole,
    /// Model identifier.
    pub model: String,
    /// The prompt.
    pub prompt: Prompt,
    /// Sampling temperature.
    pub temperature: f32,
    /// Token budget.
    pub max_tokens: u32,
}

/// A generation service reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text, citations written as `[cite:<passage_id>]`.
    pub text: String,
    /// False when the model reported it could not ground the answer.
    pub grounded: bool,
}

impl Generation {
    /// A grounded reply.
    #[must_use]
    pub fn grounded(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounded: true,
        }
    }

    /// A reply the model flagged as ungrounded.
    #[must_use]
    pub fn ungrounded(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounded: false,
        }
    }
}

/// Language-model text generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generates text for the request.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError>;
}
