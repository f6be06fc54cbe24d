//! Researcher Agent
//!
//! Answers each planned question from live web sources: fetch up to N
//! snippets, then synthesize an answer over them with the generation
//! capability. A question with no sources is a collected per-question
//! failure; the whole phase fails only when every question failed.

use crate::agents::{normalize_confidence, DEFAULT_CONFIDENCE};
use crate::llm::{Generation, GenerationRequest};
use crate::models::{Finding, FindingsArtifact, SourceRef, ARTIFACT_SCHEMA_VERSION};
use crate::search::WebSearch;
use crate::types::{AppError, AppResult, QualityTier};
use crate::utils::json::extract_json;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Whether questions are researched one at a time or concurrently.
/// Sequential mode paces questions with a fixed delay to stay inside
/// downstream rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Deserialize)]
struct AnswerRaw {
    #[serde(default)]
    answer: String,
    #[serde(default = "default_raw_confidence")]
    confidence: f64,
}

fn default_raw_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

pub struct Researcher;

impl Researcher {
    pub async fn gather(
        questions: &[String],
        mode: ResearchMode,
        sources_per_question: usize,
        question_delay: Duration,
        generation: &dyn Generation,
        search: &dyn WebSearch,
    ) -> AppResult<FindingsArtifact> {
        info!(question_count = questions.len(), ?mode, "Starting research");

        let mut findings = Vec::new();
        let mut failures: Vec<(String, AppError)> = Vec::new();

        match mode {
            ResearchMode::Parallel => {
                let tasks = questions
                    .iter()
                    .map(|q| Self::research_question(q, sources_per_question, generation, search));
                for (question, result) in questions.iter().zip(futures::future::join_all(tasks).await) {
                    match result {
                        Ok(finding) => findings.push(finding),
                        Err(e) => failures.push((question.clone(), e)),
                    }
                }
            }
            ResearchMode::Sequential => {
                for (i, question) in questions.iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(question_delay).await;
                    }
                    match Self::research_question(question, sources_per_question, generation, search)
                        .await
                    {
                        Ok(finding) => findings.push(finding),
                        Err(e) => failures.push((question.clone(), e)),
                    }
                }
            }
        }

        for (question, error) in &failures {
            warn!(question = %question, error = %error, "Research question failed");
        }

        if findings.is_empty() {
            return Err(AppError::EmptyArtifact(format!(
                "all {} research questions failed",
                questions.len()
            )));
        }

        let source_total: usize = findings.iter().map(|f| f.sources.len()).sum();
        let summary = format!(
            "Answered {} of {} questions from {} sources",
            findings.len(),
            questions.len(),
            source_total
        );

        info!(
            answered = findings.len(),
            failed = failures.len(),
            sources = source_total,
            "Research complete"
        );

        Ok(FindingsArtifact {
            findings,
            summary,
            schema_version: ARTIFACT_SCHEMA_VERSION,
        })
    }

    async fn research_question(
        question: &str,
        sources_per_question: usize,
        generation: &dyn Generation,
        search: &dyn WebSearch,
    ) -> AppResult<Finding> {
        let snippets = search.search(question, sources_per_question).await?;

        if snippets.is_empty() {
            return Err(AppError::Search(format!("no sources found for: {}", question)));
        }

        let sources: Vec<SourceRef> = snippets
            .into_iter()
            .map(|s| SourceRef {
                title: s.title,
                url: s.url,
                snippet: s.snippet,
                published: s.published,
                relevance: s.relevance,
            })
            .collect();

        let request = GenerationRequest::new(
            Self::create_synthesis_prompt(question, &sources),
            QualityTier::Fast,
        )
        .with_system(
            "You are a research assistant. Synthesize answers strictly from the \
             provided sources and report how confident the sources let you be.",
        )
        .with_temperature(0.3);

        let response = generation.generate(&request).await?;

        // Fall back to the whole response as prose when the JSON shape is off.
        let parsed: AnswerRaw = extract_json(
            &response,
            AnswerRaw {
                answer: response.trim().to_string(),
                confidence: DEFAULT_CONFIDENCE,
            },
        );

        Ok(Finding {
            question: question.to_string(),
            answer: parsed.answer,
            sources,
            confidence: normalize_confidence(parsed.confidence),
            gathered_at: chrono::Utc::now(),
        })
    }

    fn create_synthesis_prompt(question: &str, sources: &[SourceRef]) -> String {
        let mut source_block = String::new();
        for (i, source) in sources.iter().enumerate() {
            source_block.push_str(&format!(
                "[{}] {} ({})\n{}\n\n",
                i + 1,
                source.title,
                source.url,
                source.snippet
            ));
        }

        format!(
            r#"Answer the research question below using ONLY the numbered sources.

QUESTION:
{question}

SOURCES:
{source_block}
OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "answer": "2-3 paragraph synthesis citing sources as [1], [2], ...",
  "confidence": 0.0
}}

The confidence value is between 0 and 1 and reflects how well the sources
answer the question. Respond with ONLY the JSON object."#,
            question = question,
            source_block = source_block,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchError, SearchSnippet};
    use async_trait::async_trait;

    struct ScriptedGeneration(String);

    #[async_trait]
    impl Generation for ScriptedGeneration {
        async fn generate(&self, _request: &GenerationRequest) -> AppResult<String> {
            Ok(self.0.clone())
        }
    }

    /// Returns sources for every query except those listed as dry.
    struct StubSearch {
        dry_queries: Vec<String>,
    }

    impl StubSearch {
        fn wet() -> Self {
            Self { dry_queries: vec![] }
        }

        fn dry_for(queries: &[&str]) -> Self {
            Self {
                dry_queries: queries.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl WebSearch for StubSearch {
        async fn search(
            &self,
            query: &str,
            max_results: usize,
        ) -> Result<Vec<SearchSnippet>, SearchError> {
            if self.dry_queries.iter().any(|q| q == query) {
                return Ok(vec![]);
            }
            Ok((0..max_results.min(2))
                .map(|i| SearchSnippet {
                    title: format!("Source {} for {}", i, query),
                    url: format!("https://example.org/{}", i),
                    snippet: "snippet text".to_string(),
                    published: None,
                    relevance: None,
                })
                .collect())
        }
    }

    fn questions(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("question {}", i)).collect()
    }

    #[tokio::test]
    async fn test_gathers_findings_for_all_questions() {
        let generation =
            ScriptedGeneration(r#"{"answer": "synthesized", "confidence": 0.8}"#.to_string());
        let artifact = Researcher::gather(
            &questions(3),
            ResearchMode::Sequential,
            2,
            Duration::ZERO,
            &generation,
            &StubSearch::wet(),
        )
        .await
        .unwrap();

        assert_eq!(artifact.findings.len(), 3);
        assert_eq!(artifact.findings[0].answer, "synthesized");
        assert_eq!(artifact.findings[0].sources.len(), 2);
        assert!(artifact.summary.contains("3 of 3"));
    }

    #[tokio::test]
    async fn test_percent_confidence_normalized_before_storage() {
        let generation =
            ScriptedGeneration(r#"{"answer": "a", "confidence": 85}"#.to_string());
        let artifact = Researcher::gather(
            &questions(1),
            ResearchMode::Sequential,
            2,
            Duration::ZERO,
            &generation,
            &StubSearch::wet(),
        )
        .await
        .unwrap();

        let confidence = artifact.findings[0].confidence;
        assert!((confidence - 0.85).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&confidence));
    }

    #[tokio::test]
    async fn test_partial_source_failures_are_not_fatal() {
        let generation =
            ScriptedGeneration(r#"{"answer": "a", "confidence": 0.7}"#.to_string());
        let artifact = Researcher::gather(
            &questions(3),
            ResearchMode::Sequential,
            2,
            Duration::ZERO,
            &generation,
            &StubSearch::dry_for(&["question 1"]),
        )
        .await
        .unwrap();

        assert_eq!(artifact.findings.len(), 2);
        assert!(artifact.summary.contains("2 of 3"));
    }

    #[tokio::test]
    async fn test_all_questions_dry_fails_whole_operation() {
        let generation =
            ScriptedGeneration(r#"{"answer": "a", "confidence": 0.7}"#.to_string());
        let err = Researcher::gather(
            &questions(2),
            ResearchMode::Sequential,
            2,
            Duration::ZERO,
            &generation,
            &StubSearch::dry_for(&["question 0", "question 1"]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::EmptyArtifact(_)));
    }

    #[tokio::test]
    async fn test_parallel_mode_answers_everything() {
        let generation =
            ScriptedGeneration(r#"{"answer": "a", "confidence": 0.7}"#.to_string());
        let artifact = Researcher::gather(
            &questions(4),
            ResearchMode::Parallel,
            2,
            Duration::ZERO,
            &generation,
            &StubSearch::wet(),
        )
        .await
        .unwrap();

        assert_eq!(artifact.findings.len(), 4);
    }

    #[tokio::test]
    async fn test_unparsable_synthesis_keeps_prose_answer() {
        let generation = ScriptedGeneration("Plain prose, no JSON here.".to_string());
        let artifact = Researcher::gather(
            &questions(1),
            ResearchMode::Sequential,
            2,
            Duration::ZERO,
            &generation,
            &StubSearch::wet(),
        )
        .await
        .unwrap();

        assert_eq!(artifact.findings[0].answer, "Plain prose, no JSON here.");
        assert_eq!(artifact.findings[0].confidence, DEFAULT_CONFIDENCE);
    }
}
