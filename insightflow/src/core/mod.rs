//! Core domain model types for insightflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage roles and the stage/workflow status enums
//! - Retrieved passages
//! - Typed stage contributions and the final report
//! - Log entries and progress events

mod contribution;
mod event;
mod passage;
mod report;
mod status;

pub use contribution::{Contribution, ContributionBody, Critique, Findings, GapAnalysis, Synthesis};
pub use event::{LogEntry, ProgressEvent, Timestamp};
pub use passage::{merge_passages, Passage};
pub use report::{CitationEntry, Disclosure, Report, ReportSection, SectionKind};
pub use status::{StageRole, StageStatus, WorkflowStatus};
