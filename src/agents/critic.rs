//! Critic Agent
//!
//! Audits the research findings for gaps, biases, and contradictions before
//! anything is written. Critique is advisory: a generation failure here
//! degrades to a low-confidence placeholder critique instead of aborting
//! the run.

use crate::agents::normalize_confidence;
use crate::llm::{Generation, GenerationRequest};
use crate::models::{Critique, FindingsArtifact, ARTIFACT_SCHEMA_VERSION};
use crate::types::QualityTier;
use crate::utils::json::extract_json;
use serde::Deserialize;
use tracing::{info, warn};

const DEGRADED_CONFIDENCE: f64 = 0.2;

#[derive(Debug, Deserialize)]
struct CritiqueRaw {
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    gaps: Vec<String>,
    #[serde(default)]
    biases: Vec<String>,
    #[serde(default)]
    contradictions: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    overall_assessment: String,
}

pub struct Critic;

impl Critic {
    /// Never fails: the worst case is a degraded critique explaining why.
    pub async fn assess(
        topic: &str,
        findings: &FindingsArtifact,
        generation: &dyn Generation,
    ) -> Critique {
        info!(finding_count = findings.findings.len(), "Critiquing findings");

        let request = GenerationRequest::new(
            Self::create_critique_prompt(topic, findings),
            QualityTier::Fast,
        )
        .with_system(
            "You are a skeptical research reviewer. Identify what is missing, \
             one-sided, or inconsistent in the findings.",
        )
        .with_temperature(0.4);

        let response = match generation.generate(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Critique generation failed, using degraded critique");
                return Self::degraded_critique(&format!("automated critique unavailable: {}", e));
            }
        };

        let parsed: CritiqueRaw = extract_json(
            &response,
            CritiqueRaw {
                confidence: DEGRADED_CONFIDENCE,
                gaps: vec!["Critique response could not be parsed".to_string()],
                biases: vec![],
                contradictions: vec![],
                suggestions: vec![],
                overall_assessment: "Automated critique was not available for this run".to_string(),
            },
        );

        Critique {
            confidence: normalize_confidence(parsed.confidence),
            gaps: parsed.gaps,
            biases: parsed.biases,
            contradictions: parsed.contradictions,
            suggestions: parsed.suggestions,
            overall_assessment: parsed.overall_assessment,
            schema_version: ARTIFACT_SCHEMA_VERSION,
        }
    }

    fn degraded_critique(reason: &str) -> Critique {
        Critique {
            confidence: DEGRADED_CONFIDENCE,
            gaps: vec![reason.to_string()],
            biases: vec![],
            contradictions: vec![],
            suggestions: vec!["Re-run the critique once the generation capability recovers".to_string()],
            overall_assessment: "Findings were not independently critiqued".to_string(),
            schema_version: ARTIFACT_SCHEMA_VERSION,
        }
    }

    fn create_critique_prompt(topic: &str, findings: &FindingsArtifact) -> String {
        let mut digest = String::new();
        for (i, finding) in findings.findings.iter().enumerate() {
            digest.push_str(&format!(
                "### Finding {} (confidence {:.2})\nQ: {}\nA: {}\nSources: {}\n\n",
                i + 1,
                finding.confidence,
                finding.question,
                finding.answer,
                finding.sources.len()
            ));
        }

        format!(
            r#"Review the research findings below on the topic "{topic}".

FINDINGS:
{digest}
Assess coverage, balance, and internal consistency.

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "confidence": 0.0,
  "gaps": ["missing area"],
  "biases": ["one-sided framing"],
  "contradictions": ["finding X conflicts with finding Y"],
  "suggestions": ["what to emphasize or double-check when writing"],
  "overall_assessment": "One-paragraph verdict"
}}

The confidence value is between 0 and 1. Empty arrays are fine.
Respond with ONLY the JSON object."#,
            topic = topic,
            digest = digest,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Finding;
    use crate::types::{AppError, AppResult};
    use async_trait::async_trait;

    struct ScriptedGeneration(String);

    #[async_trait]
    impl Generation for ScriptedGeneration {
        async fn generate(&self, _request: &GenerationRequest) -> AppResult<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingGeneration;

    #[async_trait]
    impl Generation for FailingGeneration {
        async fn generate(&self, _request: &GenerationRequest) -> AppResult<String> {
            Err(AppError::LLMApi("provider down".to_string()))
        }
    }

    fn findings() -> FindingsArtifact {
        FindingsArtifact {
            findings: vec![Finding {
                question: "q".to_string(),
                answer: "a".to_string(),
                sources: vec![],
                confidence: 0.7,
                gathered_at: chrono::Utc::now(),
            }],
            summary: "Answered 1 of 1 questions from 0 sources".to_string(),
            schema_version: 1,
        }
    }

    #[tokio::test]
    async fn test_parses_structured_critique() {
        let generation = ScriptedGeneration(
            r#"{"confidence": 0.75, "gaps": ["cost data"], "biases": [], "contradictions": [],
                "suggestions": ["add cost section"], "overall_assessment": "solid"}"#
                .to_string(),
        );

        let critique = Critic::assess("topic", &findings(), &generation).await;
        assert!((critique.confidence - 0.75).abs() < 1e-9);
        assert_eq!(critique.gaps, vec!["cost data"]);
        assert_eq!(critique.overall_assessment, "solid");
    }

    #[tokio::test]
    async fn test_percent_confidence_normalized() {
        let generation = ScriptedGeneration(
            r#"{"confidence": 60, "gaps": [], "biases": [], "contradictions": [],
                "suggestions": [], "overall_assessment": "ok"}"#
                .to_string(),
        );

        let critique = Critic::assess("topic", &findings(), &generation).await;
        assert!((critique.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_generation_failure_degrades_instead_of_erroring() {
        let critique = Critic::assess("topic", &findings(), &FailingGeneration).await;

        assert_eq!(critique.confidence, DEGRADED_CONFIDENCE);
        assert!(!critique.gaps.is_empty());
        assert!(critique.gaps[0].contains("critique unavailable"));
    }

    #[tokio::test]
    async fn test_unparsable_response_degrades() {
        let generation = ScriptedGeneration("no json".to_string());
        let critique = Critic::assess("topic", &findings(), &generation).await;

        assert_eq!(critique.confidence, DEGRADED_CONFIDENCE);
        assert!(critique.gaps[0].contains("could not be parsed"));
    }
}
