//! Testing utilities for insightflow workflows.
//!
//! This module provides:
//! - Scripted retrieval and generation services
//! - Sample passages, canned stage output and snapshot builders
//! - Assertions over workflow results

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{
    assert_attempts_bounded, assert_log_monotonic, assert_report_grounded, assert_stage_status,
    assert_workflow_status,
};
pub use fixtures::{stage_settings, SnapshotBuilder};
pub use mocks::{
    CallHook, GenerationOutcome, RetrievalCall, RetrievalOutcome, ScriptedGeneration,
    ScriptedRetrieval,
};
