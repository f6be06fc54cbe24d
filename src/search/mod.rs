//! Web search capability.
//!
//! A narrow interface over a hosted search API. Failures here are hard
//! failures for the single call; retry policy, if any, belongs to callers.

pub mod serpapi;

use async_trait::async_trait;
use thiserror::Error;

pub use serpapi::SerpApiClient;

/// Snippet content is clipped to this length before storage.
pub const SNIPPET_MAX_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search API key not configured")]
    NoApiKey,

    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse search results: {0}")]
    ParseError(String),

    #[error("No results found for query")]
    NoResults,
}

impl From<SearchError> for crate::types::AppError {
    fn from(e: SearchError) -> Self {
        crate::types::AppError::Search(e.to_string())
    }
}

/// One ranked result from the search capability.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchSnippet {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub published: Option<String>,
    pub relevance: Option<f64>,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web for a query, returning up to `max_results` ranked
    /// snippets. An empty result set is `Ok(vec![])`, not an error; callers
    /// decide whether that is fatal.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchSnippet>, SearchError>;
}

/// Clip snippet text to `SNIPPET_MAX_CHARS`, marking the cut with an
/// ellipsis.
pub fn truncate_snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_MAX_CHARS {
        return text.to_string();
    }
    let clipped: String = text.chars().take(SNIPPET_MAX_CHARS).collect();
    format!("{}...", clipped.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_snippet_unchanged() {
        assert_eq!(truncate_snippet("short"), "short");
    }

    #[test]
    fn test_truncate_long_snippet_adds_ellipsis() {
        let long = "a".repeat(400);
        let clipped = truncate_snippet(&long);
        assert!(clipped.ends_with("..."));
        assert_eq!(clipped.chars().count(), SNIPPET_MAX_CHARS + 3);
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let long = "é".repeat(301);
        let clipped = truncate_snippet(&long);
        assert_eq!(clipped.chars().count(), SNIPPET_MAX_CHARS + 3);
    }
}
