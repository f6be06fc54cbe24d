//! Reviewer Agent
//!
//! Final editing pass over the draft: polish the prose, count the changes by
//! category, and score readability. The one invariant here is that the draft
//! is never lost — any failure hands the original draft back with a
//! "needs-work" summary.

use crate::llm::{Generation, GenerationRequest};
use crate::models::{ChangeCounts, ReviewSummary};
use crate::types::QualityTier;
use crate::utils::json::extract_json;
use serde::Deserialize;
use tracing::{info, warn};

const NEEDS_WORK: &str = "needs-work";
const DEFAULT_READABILITY: f64 = 50.0;

#[derive(Debug)]
pub struct ReviewOutcome {
    pub final_report: String,
    pub summary: ReviewSummary,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewRaw {
    final_report: Option<String>,
    #[serde(default)]
    changes: ChangesRaw,
    #[serde(default = "default_readability")]
    readability_score: f64,
    overall_quality: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChangesRaw {
    #[serde(default)]
    grammar: u32,
    #[serde(default)]
    clarity: u32,
    #[serde(default)]
    structure: u32,
    #[serde(default)]
    accuracy: u32,
}

fn default_readability() -> f64 {
    DEFAULT_READABILITY
}

pub struct Reviewer;

impl Reviewer {
    /// Never fails: the worst case returns the draft untouched.
    pub async fn review(draft: &str, tier: QualityTier, generation: &dyn Generation) -> ReviewOutcome {
        info!(draft_len = draft.len(), "Reviewing draft");

        let request = GenerationRequest::new(Self::create_review_prompt(draft), tier)
            .with_system(
                "You are a meticulous copy editor. Improve the report without changing \
                 its claims or citations.",
            )
            .with_temperature(0.3);

        let response = match generation.generate(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Review generation failed, keeping original draft");
                return Self::needs_work(draft, "review unavailable");
            }
        };

        let parsed: ReviewRaw = extract_json(&response, ReviewRaw::default());

        let final_report = match parsed.final_report {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                warn!("Review response had no usable report, keeping original draft");
                return Self::needs_work(draft, "review output unparsable");
            }
        };

        if final_report.chars().count() * 2 < draft.chars().count() {
            warn!(
                draft_len = draft.chars().count(),
                reviewed_len = final_report.chars().count(),
                "Reviewed report is less than half the draft length"
            );
        }

        let summary = ReviewSummary {
            changes: ChangeCounts {
                grammar: parsed.changes.grammar,
                clarity: parsed.changes.clarity,
                structure: parsed.changes.structure,
                accuracy: parsed.changes.accuracy,
            },
            readability_score: parsed.readability_score.clamp(0.0, 100.0) as u8,
            overall_quality: parsed
                .overall_quality
                .unwrap_or_else(|| "acceptable".to_string()),
        };

        info!(
            readability = summary.readability_score,
            quality = %summary.overall_quality,
            "Review complete"
        );

        ReviewOutcome {
            final_report,
            summary,
        }
    }

    fn needs_work(draft: &str, reason: &str) -> ReviewOutcome {
        ReviewOutcome {
            final_report: draft.to_string(),
            summary: ReviewSummary {
                changes: ChangeCounts::default(),
                readability_score: DEFAULT_READABILITY as u8,
                overall_quality: format!("{} ({})", NEEDS_WORK, reason),
            },
        }
    }

    fn create_review_prompt(draft: &str) -> String {
        format!(
            r#"Edit the markdown research report below for grammar, clarity, and
structure. Keep every factual claim and citation intact.

DRAFT:
{draft}

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "final_report": "the full edited markdown report",
  "changes": {{"grammar": 0, "clarity": 0, "structure": 0, "accuracy": 0}},
  "readability_score": 0,
  "overall_quality": "excellent | good | acceptable | needs-work"
}}

The readability score is 0-100. Respond with ONLY the JSON object."#,
            draft = draft,
        )
    }
}
