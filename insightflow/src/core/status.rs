//! Stage roles and the stage/workflow status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a stage plays in the fixed research sequence.
///
/// Variants are declared in execution order, so the derived `Ord` is the
/// pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// Analyzes the corpus and extracts key findings.
    Researcher,
    /// Critiques the findings.
    Reviewer,
    /// Synthesizes insights and hypotheses.
    Synthesizer,
    /// Identifies research gaps and follow-up questions.
    Questioner,
    /// Assembles the final report.
    Formatter,
}

impl StageRole {
    /// All roles in execution order.
    pub const ALL: [Self; 5] = [
        Self::Researcher,
        Self::Reviewer,
        Self::Synthesizer,
        Self::Questioner,
        Self::Formatter,
    ];

    /// Returns the snake_case name used in maps, logs and filters.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Reviewer => "reviewer",
            Self::Synthesizer => "synthesizer",
            Self::Questioner => "questioner",
            Self::Formatter => "formatter",
        }
    }

    /// Returns the upper-case label used in summaries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Researcher => "RESEARCHER",
            Self::Reviewer => "REVIEWER",
            Self::Synthesizer => "SYNTHESIZER",
            Self::Questioner => "QUESTIONER",
            Self::Formatter => "FORMATTER",
        }
    }

    /// Zero-based position in the sequence.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Researcher => 0,
            Self::Reviewer => 1,
            Self::Synthesizer => 2,
            Self::Questioner => 3,
            Self::Formatter => 4,
        }
    }

    /// The stage that must reach a terminal status before this one starts.
    #[must_use]
    pub const fn predecessor(&self) -> Option<Self> {
        match self {
            Self::Researcher => None,
            Self::Reviewer => Some(Self::Researcher),
            Self::Synthesizer => Some(Self::Reviewer),
            Self::Questioner => Some(Self::Synthesizer),
            Self::Formatter => Some(Self::Questioner),
        }
    }

    /// Generation temperature used when no override is configured.
    #[must_use]
    pub const fn default_temperature(&self) -> f32 {
        match self {
            Self::Researcher => 0.2,
            Self::Reviewer | Self::Formatter => 0.3,
            Self::Synthesizer | Self::Questioner => 0.4,
        }
    }

    /// Passages requested per retrieval sub-query when no override is configured.
    #[must_use]
    pub const fn default_top_k(&self) -> usize {
        match self {
            Self::Researcher => 10,
            Self::Reviewer | Self::Synthesizer => 6,
            Self::Questioner => 5,
            Self::Formatter => 0,
        }
    }

    /// Whether exhausting this stage without a usable result aborts the workflow.
    ///
    /// Downstream stages cannot operate without the Researcher's grounding,
    /// and there is no report without the Formatter.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Researcher | Self::Formatter)
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "researcher" => Ok(Self::Researcher),
            "reviewer" => Ok(Self::Reviewer),
            "synthesizer" => Ok(Self::Synthesizer),
            "questioner" => Ok(Self::Questioner),
            "formatter" => Ok(Self::Formatter),
            other => Err(format!("Unknown stage role: {other}")),
        }
    }
}

/// The execution status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not started.
    Pending,
    /// Stage is running (possibly retrying).
    Working,
    /// Stage produced a grounded, validated contribution.
    Completed,
    /// Stage produced no usable result.
    Failed,
    /// Stage produced a partial or ungrounded result.
    Degraded,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Working => write!(f, "working"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Degraded)
    }

    /// Returns true if the stage left a contribution behind.
    #[must_use]
    pub fn has_contribution(&self) -> bool {
        matches!(self, Self::Completed | Self::Degraded)
    }

    /// Returns true if moving from `self` to `next` respects
    /// `pending -> working -> {completed | failed | degraded}`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Working)
                | (Self::Working, Self::Completed | Self::Failed | Self::Degraded)
        )
    }
}

/// The status of a whole workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Context created, no stage started.
    Initialized,
    /// Stages are executing.
    Running,
    /// Every stage completed.
    Succeeded,
    /// Some stage degraded or failed, but the report was assembled.
    PartiallySucceeded,
    /// The run stopped without a report.
    Aborted,
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        Self::Initialized
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::PartiallySucceeded => write!(f, "partially_succeeded"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl WorkflowStatus {
    /// Returns true once the run has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartiallySucceeded | Self::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_order_matches_sequence() {
        let mut sorted = StageRole::ALL;
        sorted.sort();
        assert_eq!(sorted, StageRole::ALL);
        for (i, role) in StageRole::ALL.iter().enumerate() {
            assert_eq!(role.index(), i);
        }
    }

    #[test]
    fn test_role_predecessors() {
        assert_eq!(StageRole::Researcher.predecessor(), None);
        assert_eq!(StageRole::Formatter.predecessor(), Some(StageRole::Questioner));
    }

    #[test]
    fn test_role_defaults() {
        assert!((StageRole::Researcher.default_temperature() - 0.2).abs() < f32::EPSILON);
        assert!((StageRole::Questioner.default_temperature() - 0.4).abs() < f32::EPSILON);
        assert_eq!(StageRole::Formatter.default_top_k(), 0);
        assert!(StageRole::Researcher.is_critical());
        assert!(!StageRole::Reviewer.is_critical());
    }

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("Reviewer".parse::<StageRole>(), Ok(StageRole::Reviewer));
        assert!("editor".parse::<StageRole>().is_err());
        assert_eq!(StageRole::Synthesizer.to_string(), "synthesizer");
    }

    #[test]
    fn test_stage_status_transitions() {
        assert!(StageStatus::Pending.can_transition_to(StageStatus::Working));
        assert!(StageStatus::Working.can_transition_to(StageStatus::Degraded));
        assert!(!StageStatus::Completed.can_transition_to(StageStatus::Pending));
        assert!(!StageStatus::Pending.can_transition_to(StageStatus::Completed));
        assert!(!StageStatus::Failed.can_transition_to(StageStatus::Working));
    }

    #[test]
    fn test_stage_status_is_terminal() {
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Degraded.is_terminal());
        assert!(!StageStatus::Working.is_terminal());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&WorkflowStatus::PartiallySucceeded).unwrap();
        assert_eq!(json, r#""partially_succeeded""#);

        let status: StageStatus = serde_json::from_str(r#""degraded""#).unwrap();
        assert_eq!(status, StageStatus::Degraded);
    }
}
