//! Contextual records used to ground prompts

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Ellipsis appended to truncated summaries
pub const ELLIPSIS: &str = "...";

/// How closely a source matches the question's region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
}

impl Relevance {
    /// Glyph shown next to the source in the composed answer
    pub fn marker(&self) -> &'static str {
        match self {
            Relevance::High => "🔥",
            Relevance::Medium => "📊",
        }
    }
}

/// One contextual record (typically a news item)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSource {
    /// Origin name, e.g. the feed title
    pub source: String,
    pub title: String,
    pub summary: String,
    pub link: String,
    /// Publication date as shown to readers
    pub published: String,
    /// Epoch seconds used for ordering; `None` sorts last
    pub published_at: Option<i64>,
    pub relevance: Relevance,
    /// False only for synthetic placeholders
    pub real_data: bool,
}

impl ContextSource {
    /// A record fetched from a live external source.
    ///
    /// The summary is truncated to `summary_chars` characters.
    #[allow(clippy::too_many_arguments)]
    pub fn genuine(
        source: impl Into<String>,
        title: impl Into<String>,
        summary: &str,
        link: impl Into<String>,
        published: impl Into<String>,
        published_at: Option<i64>,
        relevance: Relevance,
        summary_chars: usize,
    ) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            summary: truncate_summary(summary, summary_chars),
            link: link.into(),
            published: published.into(),
            published_at,
            relevance,
            real_data: true,
        }
    }

    pub fn is_high_relevance(&self) -> bool {
        self.relevance == Relevance::High
    }
}

/// Cut `text` to `budget` characters and mark the cut with an ellipsis.
///
/// Text within the budget is returned unchanged. Counts chars, not bytes, so
/// multi-byte text is never split inside a code point.
pub fn truncate_summary(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Order sources newest first; undated sources go last, original order kept otherwise
pub fn sort_newest_first<S: Borrow<ContextSource>>(sources: &mut [S]) {
    sources.sort_by(|a, b| b.borrow().published_at.cmp(&a.borrow().published_at));
}
