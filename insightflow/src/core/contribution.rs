//! Typed stage contributions merged into the workflow context.

use super::{Report, StageRole};
use serde::{Deserialize, Serialize};

/// Researcher output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Findings {
    /// Full analysis text.
    pub analysis: String,
    /// Bullet-level findings extracted from the analysis.
    pub findings: Vec<String>,
    /// Number of passages the analysis was grounded on.
    pub num_sources: usize,
}

/// Reviewer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    /// Full critique text.
    pub critique: String,
    /// Strengths listed by the reviewer.
    pub strengths: Vec<String>,
    /// Weaknesses listed by the reviewer.
    pub weaknesses: Vec<String>,
}

/// Synthesizer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesis {
    /// Full synthesis text.
    pub synthesis: String,
    /// Testable hypotheses.
    pub hypotheses: Vec<String>,
    /// Cross-source insights.
    pub insights: Vec<String>,
}

/// Questioner output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapAnalysis {
    /// Full gap analysis text.
    pub gap_analysis: String,
    /// Knowledge gaps.
    pub gaps: Vec<String>,
    /// Follow-up research questions.
    pub questions: Vec<String>,
}

/// The role-specific payload of a contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContributionBody {
    /// Researcher findings.
    Findings(Findings),
    /// Reviewer critique.
    Critique(Critique),
    /// Synthesizer hypotheses and insights.
    Synthesis(Synthesis),
    /// Questioner gaps and questions.
    GapAnalysis(GapAnalysis),
    /// Formatter report.
    Report(Report),
}

impl ContributionBody {
    /// The role that produces this kind of body.
    #[must_use]
    pub fn role(&self) -> StageRole {
        match self {
            Self::Findings(_) => StageRole::Researcher,
            Self::Critique(_) => StageRole::Reviewer,
            Self::Synthesis(_) => StageRole::Synthesizer,
            Self::GapAnalysis(_) => StageRole::Questioner,
            Self::Report(_) => StageRole::Formatter,
        }
    }

    /// The generated prose this body was derived from.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Findings(f) => f.analysis.clone(),
            Self::Critique(c) => c.critique.clone(),
            Self::Synthesis(s) => s.synthesis.clone(),
            Self::GapAnalysis(g) => g.gap_analysis.clone(),
            Self::Report(r) => r.render(),
        }
    }
}

/// A stage's merged output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// The producing stage.
    pub stage: StageRole,
    /// True when the content could not be verified against retrieved passages.
    pub ungrounded: bool,
    /// Passage ids cited by the content, in first-appearance order.
    pub citations: Vec<String>,
    /// The typed payload.
    pub body: ContributionBody,
}

impl Contribution {
    /// Returns the findings, if this is a Researcher contribution.
    #[must_use]
    pub fn as_findings(&self) -> Option<&Findings> {
        match &self.body {
            ContributionBody::Findings(f) => Some(f),
            _ => None,
        }
    }

    /// Returns the critique, if this is a Reviewer contribution.
    #[must_use]
    pub fn as_critique(&self) -> Option<&Critique> {
        match &self.body {
            ContributionBody::Critique(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the synthesis, if this is a Synthesizer contribution.
    #[must_use]
    pub fn as_synthesis(&self) -> Option<&Synthesis> {
        match &self.body {
            ContributionBody::Synthesis(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the gap analysis, if this is a Questioner contribution.
    #[must_use]
    pub fn as_gap_analysis(&self) -> Option<&GapAnalysis> {
        match &self.body {
            ContributionBody::GapAnalysis(g) => Some(g),
            _ => None,
        }
    }

    /// Returns the report, if this is a Formatter contribution.
    #[must_use]
    pub fn as_report(&self) -> Option<&Report> {
        match &self.body {
            ContributionBody::Report(r) => Some(r),
            _ => None,
        }
    }
}
