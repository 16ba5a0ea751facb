//! Per-run workflow state.
//!
//! This module provides:
//! - [`WorkflowContext`], the mutable state owned by the orchestrator
//! - [`ContextSnapshot`], the immutable view handed to stages and callers

#[cfg(test)]
mod context_tests;
mod snapshot;
mod workflow;

pub use snapshot::ContextSnapshot;
pub use workflow::WorkflowContext;
