//! Error types for the insightflow engine.
//!
//! Transport errors from the external services are wrapped per attempt in
//! [`StageError`], which classifies recoverability and backoff. Callers of the
//! orchestrator never see those directly: a finished run carries a
//! serializable [`WorkflowErrorPayload`] instead.

use crate::core::{StageRole, StageStatus};
use crate::pipeline::RetryClass;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The crate-level error type.
#[derive(Debug, Error)]
pub enum InsightflowError {
    /// Invalid configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A context invariant was violated.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// The workflow was aborted.
    #[error("{0}")]
    Aborted(#[from] WorkflowAborted),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for InsightflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors surfaced by a [`RetrievalService`](crate::services::RetrievalService).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalError {
    /// The service could not be reached or returned a server error.
    #[error("Retrieval service unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its timeout.
    #[error("Retrieval timed out after {after_ms}ms")]
    Timeout {
        /// Elapsed budget in milliseconds.
        after_ms: u64,
    },
}

/// Errors surfaced by a [`GenerationService`](crate::services::GenerationService).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The service asked the caller to slow down.
    #[error("Generation rate limited")]
    RateLimited {
        /// Server-provided wait hint in milliseconds.
        retry_after_ms: Option<u64>,
    },

    /// The call exceeded its timeout.
    #[error("Generation timed out after {after_ms}ms")]
    Timeout {
        /// Elapsed budget in milliseconds.
        after_ms: u64,
    },

    /// The model could not be reached or returned a server error.
    #[error("Generation model unavailable: {0}")]
    Unavailable(String),
}

/// A generation cited passages that were not retrieved, or declared itself
/// ungrounded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Grounding violation in {stage}: {}", self.describe())]
pub struct GroundingViolation {
    /// The stage whose output was rejected.
    pub stage: StageRole,
    /// Cited ids that are not among the retrieved passages.
    pub unknown_citations: Vec<String>,
    /// True when the generation service flagged the output as ungrounded.
    pub model_reported_ungrounded: bool,
}

impl GroundingViolation {
    /// Creates a violation for unknown citations.
    #[must_use]
    pub fn unknown(stage: StageRole, unknown_citations: Vec<String>) -> Self {
        Self {
            stage,
            unknown_citations,
            model_reported_ungrounded: false,
        }
    }

    /// Creates a violation for output the model flagged as ungrounded.
    #[must_use]
    pub fn ungrounded(stage: StageRole) -> Self {
        Self {
            stage,
            unknown_citations: Vec::new(),
            model_reported_ungrounded: true,
        }
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.unknown_citations.is_empty() {
            parts.push(format!("unknown citations [{}]", self.unknown_citations.join(", ")));
        }
        if self.model_reported_ungrounded {
            parts.push("model reported ungrounded output".to_string());
        }
        parts.join("; ")
    }
}

/// Why a single stage attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Retrieval failed.
    #[error("{0}")]
    Retrieval(#[from] RetrievalError),

    /// Generation failed.
    #[error("{0}")]
    Generation(#[from] GenerationError),

    /// The output failed citation validation.
    #[error("{0}")]
    Grounding(#[from] GroundingViolation),

    /// The attempt exceeded the per-stage timeout.
    #[error("Stage {stage} timed out after {after_ms}ms")]
    Timeout {
        /// The stage.
        stage: StageRole,
        /// Elapsed budget in milliseconds.
        after_ms: u64,
    },

    /// The snapshot handed to the stage cannot be worked with.
    #[error("Malformed context: {0}")]
    MalformedContext(String),

    /// A context invariant rejected the attempt's result.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// The run was cancelled during the attempt.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl StageError {
    /// Returns true if another attempt may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::MalformedContext(_) | Self::Context(_) | Self::Cancelled(_)
        )
    }

    /// How the next attempt should be scheduled.
    #[must_use]
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Grounding(_) => RetryClass::Immediate,
            Self::Generation(GenerationError::RateLimited { retry_after_ms }) => {
                RetryClass::RateLimited {
                    retry_after_ms: *retry_after_ms,
                }
            }
            Self::Retrieval(_) | Self::Generation(_) | Self::Timeout { .. } => RetryClass::Standard,
            Self::MalformedContext(_) | Self::Context(_) | Self::Cancelled(_) => {
                RetryClass::NotRetryable
            }
        }
    }

    /// Short machine-readable kind, used in logs and payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Retrieval(RetrievalError::Unavailable(_)) => "retrieval_unavailable",
            Self::Retrieval(RetrievalError::Timeout { .. }) => "retrieval_timeout",
            Self::Generation(GenerationError::RateLimited { .. }) => "rate_limited",
            Self::Generation(GenerationError::Timeout { .. }) => "generation_timeout",
            Self::Generation(GenerationError::Unavailable(_)) => "model_unavailable",
            Self::Grounding(_) => "grounding_violation",
            Self::Timeout { .. } => "stage_timeout",
            Self::MalformedContext(_) => "malformed_context",
            Self::Context(_) => "context_error",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

/// A stage ended with a partial or ungrounded result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage {stage} degraded: {reason}")]
pub struct StageDegraded {
    /// The stage.
    pub stage: StageRole,
    /// Why the stage could not complete.
    pub reason: String,
}

impl StageDegraded {
    /// Creates a new degradation record.
    #[must_use]
    pub fn new(stage: StageRole, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// The workflow stopped without producing a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Workflow aborted{}: {reason}", stage.map(|s| format!(" at {s}")).unwrap_or_default())]
pub struct WorkflowAborted {
    /// The stage that caused the abort, if any.
    pub stage: Option<StageRole>,
    /// True when the abort was requested through cancellation.
    pub cancelled: bool,
    /// Human-readable reason.
    pub reason: String,
}

impl WorkflowAborted {
    /// A critical stage exhausted its attempts.
    #[must_use]
    pub fn stage_failed(stage: StageRole, reason: impl Into<String>) -> Self {
        Self {
            stage: Some(stage),
            cancelled: false,
            reason: reason.into(),
        }
    }

    /// The caller cancelled the run.
    #[must_use]
    pub fn cancelled(stage: Option<StageRole>, reason: impl Into<String>) -> Self {
        Self {
            stage,
            cancelled: true,
            reason: reason.into(),
        }
    }
}

/// Violations of [`WorkflowContext`](crate::context::WorkflowContext) invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// A status change that does not follow the stage state machine.
    #[error("Invalid transition for {stage}: {from} -> {to}")]
    InvalidTransition {
        /// The stage.
        stage: StageRole,
        /// Current status.
        from: StageStatus,
        /// Requested status.
        to: StageStatus,
    },

    /// A stage was started before its predecessor finished.
    #[error("Stage {stage} cannot start: predecessor {predecessor} is {status}")]
    PredecessorNotTerminal {
        /// The stage being started.
        stage: StageRole,
        /// Its predecessor.
        predecessor: StageRole,
        /// The predecessor's current status.
        status: StageStatus,
    },

    /// A contribution was already recorded for the stage.
    #[error("Contribution conflict: stage '{0}' already has a contribution")]
    ContributionConflict(StageRole),

    /// Passages were already recorded for the stage.
    #[error("Passages conflict: stage '{0}' already has retrieved passages")]
    PassagesConflict(StageRole),

    /// A contribution was recorded before the stage's passages.
    #[error("Stage '{0}' has no recorded passages")]
    MissingPassages(StageRole),

    /// More attempts than the retry policy allows.
    #[error("Stage '{stage}' exceeded the attempt limit of {limit}")]
    AttemptLimitExceeded {
        /// The stage.
        stage: StageRole,
        /// Maximum attempts (`max_retries + 1`).
        limit: u32,
    },

    /// The run already reached a terminal workflow status.
    #[error("Workflow already finished with status {0}")]
    WorkflowFinished(crate::core::WorkflowStatus),
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid configuration for '{field}': {message}")]
pub struct ConfigError {
    /// The offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Structured terminal error returned to callers in a
/// [`WorkflowResult`](crate::pipeline::WorkflowResult).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowErrorPayload {
    /// Machine-readable kind (e.g. "model_unavailable", "cancelled").
    pub kind: String,
    /// The stage concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageRole>,
    /// Human-readable message.
    pub message: String,
}

impl WorkflowErrorPayload {
    /// Creates a new payload.
    #[must_use]
    pub fn new(kind: impl Into<String>, stage: Option<StageRole>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            stage,
            message: message.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind));
        if let Some(stage) = self.stage {
            map.insert("stage".to_string(), serde_json::json!(stage.as_str()));
        }
        map.insert("message".to_string(), serde_json::json!(self.message));
        map
    }
}

impl From<&WorkflowAborted> for WorkflowErrorPayload {
    fn from(err: &WorkflowAborted) -> Self {
        let kind = if err.cancelled { "cancelled" } else { "workflow_aborted" };
        Self::new(kind, err.stage, err.to_string())
    }
}
