//! Role instruction templates.

use crate::core::{Passage, StageRole};
use std::fmt::Write as _;

const GROUNDING_RULES: &str = "\
GROUNDING RULES:
1. Use ONLY the numbered context passages below. Do not invent facts.
2. Cite every claim inline as [cite:<passage_id>] using the ids shown, e.g. [cite:p3] or [cite:p3, p7].
3. Never cite an id that is not listed in the context.
4. If the context does not support an answer, reply with INSUFFICIENT_CONTEXT.";

/// System instructions for a role.
#[must_use]
pub fn system_prompt(role: StageRole) -> String {
    let (persona, sections) = match role {
        StageRole::Researcher => (
            "You are a meticulous research analyst. Extract key findings, methodologies and conclusions from the research papers.",
            "- Key Findings\n- Methodologies\n- Conclusions\n- Limitations",
        ),
        StageRole::Reviewer => (
            "You are a critical research reviewer. Evaluate the findings and identify strengths, weaknesses and potential biases. Be constructive and specific.",
            "- Strengths\n- Weaknesses\n- Potential Biases\n- Gaps or Missing Information",
        ),
        StageRole::Synthesizer => (
            "You are a research synthesizer. Combine findings and critiques into new insights and 3-5 testable hypotheses, stating the evidence for each.",
            "- Key Insights\n- Patterns and Relationships\n- Testable Hypotheses (label them H1, H2, ...)\n- Research Directions",
        ),
        StageRole::Questioner => (
            "You are a research questioner. Identify knowledge gaps and generate 5-7 specific, answerable follow-up questions.",
            "- Knowledge Gaps\n- Critical Questions\n- Research Priorities",
        ),
        StageRole::Formatter => (
            "You are a research report editor. Write the executive summary and the conclusions of a report compiled from the analyses below. Do not add information that is not in the analyses.",
            "- ## Executive Summary\n- ## Conclusions",
        ),
    };

    format!("{persona}\n\n{GROUNDING_RULES}\n\nFormat your answer with these sections:\n{sections}")
}

/// Renders passages as a numbered context block.
#[must_use]
pub fn context_block(passages: &[Passage]) -> String {
    if passages.is_empty() {
        return "(no passages were retrieved)".to_string();
    }
    let mut out = String::new();
    for passage in passages {
        let _ = write!(out, "[{}] {}", passage.passage_id, passage.source_citation);
        if let Some(page) = passage.page {
            let _ = write!(out, " (page {page})");
        }
        let _ = writeln!(out, "\n{}\n", passage.text.trim());
    }
    out.trim_end().to_string()
}

/// Builds the user prompt from the task description, upstream material and
/// the context passages.
#[must_use]
pub fn user_prompt(query: &str, task: &str, upstream: &[(&str, String)], passages: &[Passage]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{task} related to: {query}\n");
    for (heading, body) in upstream {
        if body.trim().is_empty() {
            continue;
        }
        let _ = writeln!(out, "{heading}:\n{}\n", body.trim());
    }
    let _ = writeln!(out, "CONTEXT PASSAGES:\n{}", context_block(passages));
    out
}

/// Renders a list as bullet lines.
#[must_use]
pub fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.trim_start_matches(['-', ' '])))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_mentions_citation_format() {
        for role in StageRole::ALL {
            let prompt = system_prompt(role);
            assert!(prompt.contains("[cite:<passage_id>]"));
            assert!(prompt.contains("INSUFFICIENT_CONTEXT"));
        }
        assert!(system_prompt(StageRole::Formatter).contains("## Conclusions"));
    }

    #[test]
    fn test_context_block_lists_ids() {
        let block = context_block(&[
            Passage::new("p1", "Attention is all you need.", "vaswani.pdf", 0.9).with_page(3),
        ]);
        assert!(block.starts_with("[p1] vaswani.pdf (page 3)"));
        assert!(block.contains("Attention is all you need."));
        assert_eq!(context_block(&[]), "(no passages were retrieved)");
    }

    #[test]
    fn test_user_prompt_skips_empty_upstream() {
        let prompt = user_prompt(
            "sparse attention",
            "Review the analysis",
            &[("RESEARCHER'S ANALYSIS", "- a".to_string()), ("EMPTY", String::new())],
            &[],
        );
        assert!(prompt.starts_with("Review the analysis related to: sparse attention"));
        assert!(prompt.contains("RESEARCHER'S ANALYSIS:\n- a"));
        assert!(!prompt.contains("EMPTY"));
    }

    #[test]
    fn test_bullets() {
        assert_eq!(bullets(&["- a".into(), "b".into()]), "- a\n- b");
    }
}
