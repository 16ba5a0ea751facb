//! Line heuristics that turn generated prose into structured fields.
//!
//! All functions are pure, so identical text always yields identical
//! structure.

use regex::Regex;
use std::sync::LazyLock;

static HYPOTHESIS_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)\bh[1-5]\b").expect("hypothesis label pattern is valid")
});

static LIST_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^(?:[-*+]|\d+[.)])\s").expect("list marker pattern is valid")
});

const MAX_FINDINGS: usize = 10;
const MAX_SECTION_ITEMS: usize = 5;
const MAX_HYPOTHESES: usize = 5;
const MAX_INSIGHTS: usize = 5;
const MAX_GAPS: usize = 5;
const MAX_QUESTIONS: usize = 7;

fn trimmed_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn is_item(line: &str) -> bool {
    LIST_MARKER_RE.is_match(line)
}

fn is_heading(line: &str) -> bool {
    line.starts_with('#')
        || (line.starts_with("**") && line.ends_with("**"))
        || (line.ends_with(':') && !is_item(line))
}

/// Bullet or numbered lines.
#[must_use]
pub fn findings(text: &str) -> Vec<String> {
    trimmed_lines(text)
        .filter(|line| is_item(line))
        .take(MAX_FINDINGS)
        .map(String::from)
        .collect()
}

/// Item lines listed under a heading that names `section`.
///
/// Collection stops at the next heading or the next long prose line.
#[must_use]
pub fn section_items(text: &str, section: &str) -> Vec<String> {
    let needle = section.to_lowercase();
    let mut items = Vec::new();
    let mut in_section = false;

    for line in trimmed_lines(text) {
        let lower = line.to_lowercase();
        if !in_section {
            if lower.contains(&needle) && (is_heading(line) || is_item(line)) && line.len() <= 60 {
                in_section = true;
            }
            continue;
        }
        if is_item(line) {
            items.push(line.to_string());
            if items.len() == MAX_SECTION_ITEMS {
                break;
            }
        } else if is_heading(line) || line.len() > 50 {
            break;
        }
    }

    items
}

/// Lines that state a hypothesis.
#[must_use]
pub fn hypotheses(text: &str) -> Vec<String> {
    trimmed_lines(text)
        .filter(|line| {
            line.len() > 20
                && (line.to_lowercase().contains("hypothesis") || HYPOTHESIS_LABEL_RE.is_match(line))
        })
        .take(MAX_HYPOTHESES)
        .map(String::from)
        .collect()
}

/// Lines that describe an insight, pattern or relationship.
#[must_use]
pub fn insights(text: &str) -> Vec<String> {
    trimmed_lines(text)
        .filter(|line| {
            let lower = line.to_lowercase();
            line.len() > 30
                && (lower.contains("insight")
                    || lower.contains("pattern")
                    || lower.contains("relationship"))
        })
        .take(MAX_INSIGHTS)
        .map(String::from)
        .collect()
}

/// Lines that name a knowledge gap.
#[must_use]
pub fn gaps(text: &str) -> Vec<String> {
    trimmed_lines(text)
        .filter(|line| line.len() > 20 && line.to_lowercase().contains("gap"))
        .take(MAX_GAPS)
        .map(String::from)
        .collect()
}

/// Lines that ask a question.
#[must_use]
pub fn questions(text: &str) -> Vec<String> {
    trimmed_lines(text)
        .filter(|line| line.len() > 10 && line.contains('?'))
        .take(MAX_QUESTIONS)
        .map(String::from)
        .collect()
}

/// Strips list markers and citation markers, for reuse as a search query.
#[must_use]
pub fn plain_item(line: &str) -> String {
    let without_marker = line
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '.' || c == ')' || c.is_ascii_digit())
        .trim();
    super::citations::strip_citations(without_marker)
        .trim()
        .to_string()
}
