//! SerpAPI client
//!
//! Web search backed by SerpAPI's Google engine. Results come back as one
//! JSON document; the ranked organic results are mapped into
//! [`SearchSnippet`] values with clipped snippet text.

use crate::search::{truncate_snippet, SearchError, SearchSnippet, WebSearch};
use async_trait::async_trait;
use serpapi_search_rust::serp_api_search::SerpApiSearch;
use std::collections::HashMap;
use tracing::{debug, info};

pub struct SerpApiClient {
    api_key: String,
}

impl SerpApiClient {
    pub fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Configure client from config; `None` when no key is set.
    pub fn from_config(config: &crate::config::SearchConfig) -> Option<Self> {
        if config.serpapi_key.is_empty() {
            return None;
        }

        Some(Self {
            api_key: config.serpapi_key.clone(),
        })
    }

    fn parse_results(results: &serde_json::Value, max_results: usize) -> Result<Vec<SearchSnippet>, SearchError> {
        let organic_results = match results.get("organic_results") {
            Some(value) => value,
            // A well-formed response with no organic section means the query
            // simply matched nothing.
            None => return Ok(Vec::new()),
        };

        let results_array = organic_results
            .as_array()
            .ok_or_else(|| SearchError::ParseError("Expected array of results".to_string()))?;

        let mut snippets = Vec::new();
        for result in results_array.iter().take(max_results) {
            let title = result
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("Untitled")
                .to_string();

            let url = match result.get("link").and_then(|v| v.as_str()) {
                Some(link) if !link.is_empty() => link.to_string(),
                _ => continue, // a source without a link is useless downstream
            };

            let snippet = result
                .get("snippet")
                .and_then(|v| v.as_str())
                .map(truncate_snippet)
                .unwrap_or_default();

            let published = result
                .get("date")
                .and_then(|v| v.as_str())
                .map(String::from);

            let relevance = result.get("relevance_score").and_then(|v| v.as_f64());

            snippets.push(SearchSnippet {
                title,
                url,
                snippet,
                published,
                relevance,
            });
        }

        Ok(snippets)
    }
}

#[async_trait]
impl WebSearch for SerpApiClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchSnippet>, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::NoApiKey);
        }

        info!(query = %query, max_results, "Searching via SerpAPI");

        let mut params = HashMap::<String, String>::new();
        params.insert("engine".to_string(), "google".to_string());
        params.insert("q".to_string(), query.to_string());
        params.insert("hl".to_string(), "en".to_string());
        params.insert("num".to_string(), max_results.to_string());

        let search = SerpApiSearch::google(params, self.api_key.clone());

        let results = search
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        debug!("Raw search response received");

        let snippets = Self::parse_results(&results, max_results)?;
        info!(count = snippets.len(), "Search completed");
        Ok(snippets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results_maps_fields() {
        let raw = serde_json::json!({
            "organic_results": [
                {
                    "title": "Grid storage overview",
                    "link": "https://example.org/storage",
                    "snippet": "Battery storage is growing.",
                    "date": "2026-01-15"
                },
                {
                    "title": "No link entry",
                    "snippet": "dropped"
                }
            ]
        });

        let snippets = SerpApiClient::parse_results(&raw, 10).unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].title, "Grid storage overview");
        assert_eq!(snippets[0].url, "https://example.org/storage");
        assert_eq!(snippets[0].published.as_deref(), Some("2026-01-15"));
        assert!(snippets[0].relevance.is_none());
    }

    #[test]
    fn test_parse_results_respects_cap() {
        let entries: Vec<_> = (0..8)
            .map(|i| {
                serde_json::json!({
                    "title": format!("r{i}"),
                    "link": format!("https://example.org/{i}"),
                    "snippet": "s"
                })
            })
            .collect();
        let raw = serde_json::json!({ "organic_results": entries });

        let snippets = SerpApiClient::parse_results(&raw, 3).unwrap();
        assert_eq!(snippets.len(), 3);
    }

    #[test]
    fn test_parse_results_truncates_snippets() {
        let raw = serde_json::json!({
            "organic_results": [{
                "title": "t",
                "link": "https://example.org",
                "snippet": "x".repeat(400)
            }]
        });

        let snippets = SerpApiClient::parse_results(&raw, 10).unwrap();
        assert!(snippets[0].snippet.ends_with("..."));
    }

    #[test]
    fn test_parse_results_empty_response_is_ok() {
        let raw = serde_json::json!({ "search_metadata": {} });
        let snippets = SerpApiClient::parse_results(&raw, 10).unwrap();
        assert!(snippets.is_empty());
    }
}
