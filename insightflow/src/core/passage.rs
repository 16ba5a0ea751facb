//! Retrieved passages and the merge rules applied to them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A passage returned by the retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Unique identifier, used for deduplication and citation.
    pub passage_id: String,
    /// The passage text.
    pub text: String,
    /// Human-readable source (document name, URL, ...).
    pub source_citation: String,
    /// Relevance score; higher is better.
    pub score: f64,
    /// Page within the source document, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl Passage {
    /// Creates a new passage.
    #[must_use]
    pub fn new(
        passage_id: impl Into<String>,
        text: impl Into<String>,
        source_citation: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            passage_id: passage_id.into(),
            text: text.into(),
            source_citation: source_citation.into(),
            score,
            page: None,
        }
    }

    /// Sets the page number.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// Merges passage lists, keeping one entry per `passage_id`.
///
/// The highest-scoring duplicate wins. The result is ordered by descending
/// score; equal scores keep their first-appearance order.
#[must_use]
pub fn merge_passages<I>(lists: I) -> Vec<Passage>
where
    I: IntoIterator<Item = Vec<Passage>>,
{
    let mut merged: Vec<Passage> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for passage in lists.into_iter().flatten() {
        match positions.get(&passage.passage_id) {
            Some(&idx) => {
                if passage.score > merged[idx].score {
                    merged[idx] = passage;
                }
            }
            None => {
                positions.insert(passage.passage_id.clone(), merged.len());
                merged.push(passage);
            }
        }
    }

    // stable sort keeps first-appearance order for ties
    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged
}
