//! # Insightflow
//!
//! An orchestration engine that turns a research query into a
//! citation-grounded Collective Insight Report.
//!
//! A run passes through five stages in a fixed order:
//!
//! - **Researcher**: retrieves evidence and extracts key findings
//! - **Reviewer**: critiques the findings against further evidence
//! - **Synthesizer**: derives insights and testable hypotheses
//! - **Questioner**: identifies gaps and follow-up questions
//! - **Formatter**: writes the summary and conclusions, then assembles the report
//!
//! Every stage grounds its output in retrieved passages and cites them as
//! `[cite:ID]`. Citations that do not match a retrieved passage are rejected
//! and the attempt is retried. Stages that still cannot produce grounded
//! output are degraded or failed and disclosed in the report.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use insightflow::prelude::*;
//! use std::sync::Arc;
//!
//! let ports = StagePorts::new(Arc::new(my_retrieval), Arc::new(my_generation));
//! let orchestrator = Orchestrator::new(EngineConfig::default(), ports)?
//!     .with_event_sink(Arc::new(LoggingEventSink::default()));
//!
//! let result = orchestrator
//!     .run(WorkflowRequest::new("efficient attention for long documents"))
//!     .await?;
//! println!("{}", result.report);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod services;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{EngineConfig, StageTuning};
    pub use crate::context::{ContextSnapshot, WorkflowContext};
    pub use crate::core::{
        Contribution, ContributionBody, LogEntry, Passage, ProgressEvent, Report, StageRole,
        StageStatus, WorkflowStatus,
    };
    pub use crate::errors::{
        ConfigError, GenerationError, InsightflowError, RetrievalError, StageError,
        WorkflowAborted, WorkflowErrorPayload,
    };
    pub use crate::events::{
        ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::pipeline::{
        Orchestrator, RetryConfig, WorkflowOptions, WorkflowRequest, WorkflowResult,
    };
    pub use crate::services::{Generation, GenerationService, RetrievalService};
    pub use crate::stages::{Stage, StagePorts};
}
