//! The Collective Insight Report model and its markdown rendering.

use super::{StageRole, StageStatus};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Report sections, in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Executive Summary.
    ExecutiveSummary,
    /// Key Findings.
    KeyFindings,
    /// Critical Analysis.
    CriticalAnalysis,
    /// Synthesized Insights.
    SynthesizedInsights,
    /// Hypotheses.
    Hypotheses,
    /// Research Gaps & Questions.
    ResearchGaps,
    /// Conclusions.
    Conclusions,
    /// Sources.
    Sources,
}

impl SectionKind {
    /// All sections in rendering order.
    pub const ALL: [Self; 8] = [
        Self::ExecutiveSummary,
        Self::KeyFindings,
        Self::CriticalAnalysis,
        Self::SynthesizedInsights,
        Self::Hypotheses,
        Self::ResearchGaps,
        Self::Conclusions,
        Self::Sources,
    ];

    /// The heading text.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "Executive Summary",
            Self::KeyFindings => "Key Findings",
            Self::CriticalAnalysis => "Critical Analysis",
            Self::SynthesizedInsights => "Synthesized Insights",
            Self::Hypotheses => "Hypotheses",
            Self::ResearchGaps => "Research Gaps & Questions",
            Self::Conclusions => "Conclusions",
            Self::Sources => "Sources",
        }
    }

    /// Sections whose content comes from the given upstream stage.
    #[must_use]
    pub fn fed_by(role: StageRole) -> &'static [Self] {
        match role {
            StageRole::Researcher => &[Self::KeyFindings],
            StageRole::Reviewer => &[Self::CriticalAnalysis],
            StageRole::Synthesizer => &[Self::SynthesizedInsights, Self::Hypotheses],
            StageRole::Questioner => &[Self::ResearchGaps],
            StageRole::Formatter => &[Self::ExecutiveSummary, Self::Conclusions],
        }
    }
}

/// One rendered section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    /// Which section this is.
    pub kind: SectionKind,
    /// Markdown body.
    pub body: String,
}

/// An explicit note that some stage's content is missing or unverified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disclosure {
    /// The affected stage.
    pub stage: StageRole,
    /// The stage's terminal status.
    pub status: StageStatus,
    /// Sections that are omitted or unverified because of it.
    pub affected_sections: Vec<SectionKind>,
    /// Human-readable explanation.
    pub detail: String,
}

impl Disclosure {
    /// Renders the disclosure as a single sentence.
    #[must_use]
    pub fn sentence(&self) -> String {
        let sections = self
            .affected_sections
            .iter()
            .map(SectionKind::title)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "The {} stage {}; affected content: {}. {}",
            self.stage.label(),
            self.status,
            sections,
            self.detail
        )
    }
}

/// One entry of the consolidated citation index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationEntry {
    /// 1-based position in order of first appearance.
    pub index: usize,
    /// The cited passage id.
    pub passage_id: String,
    /// Source of the passage.
    pub source_citation: String,
    /// Page within the source, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// The final assembled report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// The research query.
    pub query: String,
    /// Sections in rendering order.
    pub sections: Vec<ReportSection>,
    /// Degradation disclosures.
    #[serde(default)]
    pub disclosures: Vec<Disclosure>,
    /// Consolidated citation index.
    #[serde(default)]
    pub citation_index: Vec<CitationEntry>,
}

impl Report {
    /// Returns a section body by kind.
    #[must_use]
    pub fn section(&self, kind: SectionKind) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.body.as_str())
    }

    /// Returns true if any disclosure was recorded.
    #[must_use]
    pub fn has_disclosures(&self) -> bool {
        !self.disclosures.is_empty()
    }

    /// Renders the report as markdown.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Collective Insight Report\n");
        let _ = writeln!(out, "**Query:** {}\n", self.query);

        for disclosure in &self.disclosures {
            let _ = writeln!(out, "> **Disclosure:** {}", disclosure.sentence());
        }
        if !self.disclosures.is_empty() {
            out.push('\n');
        }

        for section in &self.sections {
            let _ = writeln!(out, "## {}\n", section.kind.title());
            let _ = writeln!(out, "{}\n", section.body.trim_end());
        }

        out.trim_end().to_string()
    }
}
