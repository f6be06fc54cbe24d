//! JSON extraction from model output.
//!
//! Models asked for JSON frequently wrap it in a fenced code block or pad it
//! with prose. Callers supply a fallback value so a malformed response
//! degrades instead of erroring; agents that cannot accept the fallback
//! validate the result afterwards.

use serde::de::DeserializeOwned;

/// Parse JSON out of raw model output, returning `fallback` on any failure.
pub fn extract_json<T: DeserializeOwned>(raw: &str, fallback: T) -> T {
    match serde_json::from_str(strip_fences(raw)) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse model output as JSON, using fallback");
            fallback
        }
    }
}

/// Pull the payload out of a ```json fenced block, a bare ``` block, or
/// return the trimmed input unchanged.
fn strip_fences(raw: &str) -> &str {
    if raw.contains("```json") {
        raw.split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(raw)
            .trim()
    } else if raw.contains("```") {
        raw.split("```").nth(1).unwrap_or(raw).trim()
    } else {
        raw.trim()
    }
}
