//! Formatter: writes the summary and conclusions and assembles the report.

use super::{citations, prompts, require_query, QuerySpec, Stage, StageSettings};
use crate::context::ContextSnapshot;
use crate::core::{
    merge_passages, CitationEntry, ContributionBody, Disclosure, Passage, Report, ReportSection,
    SectionKind, StageRole, StageStatus,
};
use crate::errors::StageError;
use crate::services::{Generation, Prompt};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Write as _;

const NO_SUMMARY: &str = "_No executive summary was produced._";
const NO_CONCLUSIONS: &str = "_No separate conclusions were produced; see the Executive Summary._";
const NO_HYPOTHESES: &str = "_No testable hypotheses were identified._";
const NO_SOURCES: &str = "_No sources were cited._";

/// The last stage. Works only from upstream material: it carries every
/// upstream passage and issues no retrieval call of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatterStage;

#[async_trait]
impl Stage for FormatterStage {
    fn role(&self) -> StageRole {
        StageRole::Formatter
    }

    fn prepare_query(
        &self,
        snapshot: &ContextSnapshot,
        _settings: &StageSettings,
    ) -> Result<QuerySpec, StageError> {
        require_query(snapshot)?;
        Ok(QuerySpec::new(Vec::new()).with_carried(snapshot.all_passages()))
    }

    fn build_prompt(&self, passages: &[Passage], snapshot: &ContextSnapshot) -> Prompt {
        let upstream: Vec<(&str, String)> = [
            ("RESEARCH ANALYSIS", StageRole::Researcher),
            ("CRITICAL REVIEW", StageRole::Reviewer),
            ("SYNTHESIS AND HYPOTHESES", StageRole::Synthesizer),
            ("RESEARCH GAPS AND QUESTIONS", StageRole::Questioner),
        ]
        .into_iter()
        .map(|(heading, role)| {
            let text = snapshot
                .contribution(role)
                .map(|c| c.body.text())
                .unwrap_or_default();
            (heading, text)
        })
        .collect();

        let mut user = prompts::user_prompt(
            snapshot.query(),
            "Compile the summary and conclusions of a research report",
            &upstream,
            passages,
        );
        user.push_str(
            "\nWrite a concise executive summary under '## Executive Summary' and the \
             overall conclusions under '## Conclusions'. Keep every citation you rely on.\n",
        );
        Prompt {
            system: prompts::system_prompt(self.role()),
            user,
        }
    }

    fn contribute(
        &self,
        generation: &Generation,
        passages: &[Passage],
        snapshot: &ContextSnapshot,
        ungrounded: bool,
    ) -> ContributionBody {
        ContributionBody::Report(ReportAssembler::assemble(
            snapshot,
            &generation.text,
            passages,
            ungrounded,
        ))
    }
}

/// Builds the Collective Insight Report from upstream contributions and the
/// Formatter's own text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAssembler;

impl ReportAssembler {
    /// Assembles the report.
    ///
    /// Sections follow [`SectionKind::ALL`]. Every degraded or failed
    /// upstream stage gets a disclosure, as does an ungrounded Formatter.
    /// The citation index unions the passage ids cited by every stage, in
    /// stage order, followed by the Formatter's own citations.
    #[must_use]
    pub fn assemble(
        snapshot: &ContextSnapshot,
        formatter_text: &str,
        formatter_passages: &[Passage],
        formatter_ungrounded: bool,
    ) -> Report {
        let (summary, conclusions) = split_summary(formatter_text);

        let mut sections: Vec<ReportSection> = SectionKind::ALL
            .iter()
            .filter(|kind| **kind != SectionKind::Sources)
            .map(|&kind| ReportSection {
                kind,
                body: section_body(kind, snapshot, &summary, &conclusions),
            })
            .collect();

        let pool = merge_passages([snapshot.all_passages(), formatter_passages.to_vec()]);
        let citation_index = citation_index(snapshot, formatter_text, &pool);
        sections.push(ReportSection {
            kind: SectionKind::Sources,
            body: sources_body(&citation_index),
        });

        Report {
            query: snapshot.query().to_string(),
            sections,
            disclosures: disclosures(snapshot, formatter_ungrounded),
            citation_index,
        }
    }
}

/// Splits Formatter text at its conclusions heading.
fn split_summary(text: &str) -> (String, String) {
    let lines: Vec<&str> = text.lines().collect();
    let is_conclusions = |line: &&str| {
        let trimmed = line.trim();
        trimmed.starts_with('#') && trimmed.to_lowercase().contains("conclusion")
    };
    let (summary_lines, conclusion_lines) = match lines.iter().position(is_conclusions) {
        Some(at) => (&lines[..at], &lines[at + 1..]),
        None => (&lines[..], &[][..]),
    };

    let summary = summary_lines
        .iter()
        .filter(|line| {
            let trimmed = line.trim();
            !(trimmed.starts_with('#') && trimmed.to_lowercase().contains("summary"))
        })
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    (
        summary.trim().to_string(),
        conclusion_lines.join("\n").trim().to_string(),
    )
}

fn omitted(role: StageRole) -> String {
    format!(
        "_Omitted: the {} stage failed and produced no usable output._",
        role.label()
    )
}

fn list_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.trim().to_string()
    } else {
        prompts::bullets(items)
    }
}

fn section_body(
    kind: SectionKind,
    snapshot: &ContextSnapshot,
    summary: &str,
    conclusions: &str,
) -> String {
    let or_else = |text: &str, fallback: &str| {
        if text.is_empty() {
            fallback.to_string()
        } else {
            text.to_string()
        }
    };

    match kind {
        SectionKind::ExecutiveSummary => or_else(summary, NO_SUMMARY),
        SectionKind::Conclusions => or_else(conclusions, NO_CONCLUSIONS),
        SectionKind::KeyFindings => snapshot
            .contribution(StageRole::Researcher)
            .and_then(|c| c.as_findings())
            .map_or_else(
                || omitted(StageRole::Researcher),
                |f| list_or(&f.findings, &f.analysis),
            ),
        SectionKind::CriticalAnalysis => snapshot
            .contribution(StageRole::Reviewer)
            .and_then(|c| c.as_critique())
            .map_or_else(
                || omitted(StageRole::Reviewer),
                |c| c.critique.trim().to_string(),
            ),
        SectionKind::SynthesizedInsights => snapshot
            .contribution(StageRole::Synthesizer)
            .and_then(|c| c.as_synthesis())
            .map_or_else(
                || omitted(StageRole::Synthesizer),
                |s| s.synthesis.trim().to_string(),
            ),
        SectionKind::Hypotheses => snapshot
            .contribution(StageRole::Synthesizer)
            .and_then(|c| c.as_synthesis())
            .map_or_else(
                || omitted(StageRole::Synthesizer),
                |s| list_or(&s.hypotheses, NO_HYPOTHESES),
            ),
        SectionKind::ResearchGaps => snapshot
            .contribution(StageRole::Questioner)
            .and_then(|c| c.as_gap_analysis())
            .map_or_else(
                || omitted(StageRole::Questioner),
                |g| {
                    let items: Vec<String> =
                        g.gaps.iter().chain(&g.questions).cloned().collect();
                    list_or(&items, &g.gap_analysis)
                },
            ),
        SectionKind::Sources => String::new(),
    }
}

fn disclosures(snapshot: &ContextSnapshot, formatter_ungrounded: bool) -> Vec<Disclosure> {
    let mut out: Vec<Disclosure> = StageRole::ALL
        .iter()
        .filter(|role| **role != StageRole::Formatter)
        .filter_map(|&role| {
            let status = snapshot.status(role);
            let detail = match status {
                StageStatus::Degraded => {
                    "Its content is included but could not be fully verified against retrieved sources."
                }
                StageStatus::Failed => "It produced no usable output, so the affected content is omitted.",
                _ => return None,
            };
            Some(Disclosure {
                stage: role,
                status,
                affected_sections: SectionKind::fed_by(role).to_vec(),
                detail: detail.to_string(),
            })
        })
        .collect();

    if formatter_ungrounded {
        out.push(Disclosure {
            stage: StageRole::Formatter,
            status: StageStatus::Degraded,
            affected_sections: SectionKind::fed_by(StageRole::Formatter).to_vec(),
            detail: "The summary and conclusions are not grounded in retrieved passages."
                .to_string(),
        });
    }
    out
}

fn citation_index(snapshot: &ContextSnapshot, formatter_text: &str, pool: &[Passage]) -> Vec<CitationEntry> {
    let upstream = StageRole::ALL
        .iter()
        .filter_map(|role| snapshot.contribution(*role))
        .flat_map(|c| c.citations.iter().cloned());
    let cited = upstream.chain(citations::parse_citations(formatter_text));

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for id in cited {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(passage) = pool.iter().find(|p| p.passage_id == id) {
            entries.push(CitationEntry {
                index: entries.len() + 1,
                passage_id: passage.passage_id.clone(),
                source_citation: passage.source_citation.clone(),
                page: passage.page,
            });
        }
    }
    entries
}

fn sources_body(index: &[CitationEntry]) -> String {
    if index.is_empty() {
        return NO_SOURCES.to_string();
    }
    let mut out = String::new();
    for entry in index {
        let _ = write!(out, "{}. [{}] {}", entry.index, entry.passage_id, entry.source_citation);
        if let Some(page) = entry.page {
            let _ = write!(out, ", page {page}");
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}
