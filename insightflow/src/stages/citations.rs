//! Citation markers in generated text.
//!
//! Generated text cites passages inline as `[cite:<passage_id>]`; several ids
//! may share one marker, separated by commas (`[cite:p1, p4]`).

use crate::core::{Passage, StageRole};
use crate::errors::GroundingViolation;
use crate::services::Generation;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\[cite:\s*([^\]]+)\]").expect("citation pattern is valid")
});

/// A marker together with the horizontal whitespace before it.
static MARKER_WITH_LEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"([ \t]*)\[cite:\s*([^\]]+)\]").expect("citation marker pattern is valid")
});

fn ids_in(marker_body: &str) -> impl Iterator<Item = &str> {
    marker_body.split(',').map(str::trim).filter(|id| !id.is_empty())
}

/// Returns the cited passage ids in order of first appearance, deduplicated.
#[must_use]
pub fn parse_citations(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for caps in CITATION_RE.captures_iter(text) {
        for id in ids_in(&caps[1]) {
            if seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}

/// Removes every citation marker.
#[must_use]
pub fn strip_citations(text: &str) -> String {
    retain_citations(text, &HashSet::new())
}

/// Rewrites markers so that only ids in `known` remain.
///
/// An emptied marker is removed with the spaces before it; all other text is
/// left as is.
#[must_use]
pub fn retain_citations(text: &str, known: &HashSet<&str>) -> String {
    MARKER_WITH_LEAD_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let kept: Vec<&str> = ids_in(&caps[2]).filter(|id| known.contains(id)).collect();
            if kept.is_empty() {
                String::new()
            } else {
                format!("{}[cite:{}]", &caps[1], kept.join(", "))
            }
        })
        .into_owned()
}

/// Cited ids that are not among `passages`, in order of first appearance.
#[must_use]
pub fn unknown_citations(text: &str, passages: &[Passage]) -> Vec<String> {
    let known: HashSet<&str> = passages.iter().map(|p| p.passage_id.as_str()).collect();
    parse_citations(text)
        .into_iter()
        .filter(|id| !known.contains(id.as_str()))
        .collect()
}

/// Checks that a generation is grounded in `passages`.
///
/// # Errors
///
/// Returns a [`GroundingViolation`] naming the unknown ids, or flagging the
/// model's own ungrounded verdict.
pub fn validate_grounding(
    stage: StageRole,
    generation: &Generation,
    passages: &[Passage],
) -> Result<(), GroundingViolation> {
    let unknown = unknown_citations(&generation.text, passages);
    if unknown.is_empty() && generation.grounded {
        return Ok(());
    }
    Err(GroundingViolation {
        stage,
        unknown_citations: unknown,
        model_reported_ungrounded: !generation.grounded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn passages() -> Vec<Passage> {
        vec![
            Passage::new("p1", "a", "doc.pdf", 0.9),
            Passage::new("p2", "b", "doc.pdf", 0.8),
        ]
    }

    #[test]
    fn test_parse_citations_dedupes_in_order() {
        let text = "First [cite:p2]. Second [cite: p1, p2]. Third [cite:p3]";
        assert_eq!(parse_citations(text), vec!["p2", "p1", "p3"]);
    }

    #[test]
    fn test_parse_citations_ignores_other_brackets() {
        assert!(parse_citations("see [1] and [note]").is_empty());
    }

    #[test]
    fn test_strip_citations() {
        let text = "- Finding one [cite:p1].\n- Finding two [cite:p2, p9]";
        assert_eq!(strip_citations(text), "- Finding one.\n- Finding two");
    }

    #[test]
    fn test_retain_citations_keeps_known_ids() {
        let known: HashSet<&str> = ["p1"].into_iter().collect();
        let text = "Claim [cite:p1, p9]. Other [cite:p9].";
        assert_eq!(retain_citations(text, &known), "Claim [cite:p1]. Other.");
    }

    #[test]
    fn test_retain_citations_leaves_unrelated_text_alone() {
        let known: HashSet<&str> = ["p1"].into_iter().collect();
        let text = "- Top [cite:p1]\n    - nested detail\nPorted to the .NET runtime.\n";
        assert_eq!(retain_citations(text, &known), text);
        assert_eq!(
            strip_citations(text),
            "- Top\n    - nested detail\nPorted to the .NET runtime.\n"
        );
    }

    #[test]
    fn test_validate_grounding() {
        let ok = Generation::grounded("Claim [cite:p1]");
        assert!(validate_grounding(StageRole::Reviewer, &ok, &passages()).is_ok());

        let no_citations = Generation::grounded("Plain prose.");
        assert!(validate_grounding(StageRole::Reviewer, &no_citations, &passages()).is_ok());

        let bad = Generation::grounded("Claim [cite:p7]");
        let err = validate_grounding(StageRole::Reviewer, &bad, &passages()).unwrap_err();
        assert_eq!(err.unknown_citations, vec!["p7"]);
        assert!(!err.model_reported_ungrounded);

        let flagged = Generation::ungrounded("Claim [cite:p1]");
        let err = validate_grounding(StageRole::Reviewer, &flagged, &passages()).unwrap_err();
        assert!(err.model_reported_ungrounded);
        assert!(err.unknown_citations.is_empty());
    }
}
