//! Workflow execution.
//!
//! This module provides:
//! - The [`Orchestrator`] that runs the five stages in order
//! - Per-run options and the returned [`WorkflowResult`]
//! - Retry classification and backoff

mod options;
mod orchestrator;
mod result;
mod retry;


pub use options::{WorkflowOptions, WorkflowRequest};
pub use orchestrator::Orchestrator;
pub use result::WorkflowResult;
pub use retry::{
    BackoffStrategy, JitterStrategy, RetryClass, RetryConfig, RetryDecision, RetryState,
};
