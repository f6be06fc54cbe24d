//! Planner Agent
//!
//! Turns a research topic into a structured plan: 5-7 research questions,
//! an approach narrative, and a depth estimate. A malformed model response
//! degrades to a deterministic templated plan; a plan with too few questions
//! is an error the engine sees, not something papered over.

use crate::llm::{Generation, GenerationRequest};
use crate::models::{ResearchDepth, ResearchPlan, ARTIFACT_SCHEMA_VERSION};
use crate::types::{AppError, AppResult, QualityTier};
use crate::utils::json::extract_json;
use serde::Deserialize;
use tracing::{info, warn};

pub const MIN_QUESTIONS: usize = 5;
pub const MAX_QUESTIONS: usize = 7;

#[derive(Debug, Deserialize)]
struct PlanRaw {
    #[serde(default)]
    questions: Vec<String>,
    #[serde(default)]
    approach: String,
    #[serde(default)]
    estimated_depth: String,
}

pub struct Planner;

impl Planner {
    pub async fn generate_plan(topic: &str, generation: &dyn Generation) -> AppResult<ResearchPlan> {
        info!(topic = %topic, "Generating research plan");

        let request = GenerationRequest::new(Self::create_plan_prompt(topic), QualityTier::Fast)
            .with_system(
                "You are a research planning assistant. Break topics into focused, \
                 answerable research questions.",
            )
            .with_temperature(0.4);

        let response = generation.generate(&request).await?;

        let parsed: PlanRaw = extract_json(&response, Self::template_plan(topic));

        let mut questions: Vec<String> = parsed
            .questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();

        if questions.len() < MIN_QUESTIONS {
            return Err(AppError::EmptyArtifact(format!(
                "planner produced {} questions, need at least {}",
                questions.len(),
                MIN_QUESTIONS
            )));
        }

        if questions.len() > MAX_QUESTIONS {
            warn!(
                count = questions.len(),
                "Planner produced too many questions, truncating"
            );
            questions.truncate(MAX_QUESTIONS);
        }

        let approach = if parsed.approach.trim().is_empty() {
            format!("Systematic web research on {}", topic)
        } else {
            parsed.approach
        };

        let plan = ResearchPlan {
            questions,
            approach,
            estimated_depth: Self::parse_depth(&parsed.estimated_depth),
            schema_version: ARTIFACT_SCHEMA_VERSION,
        };

        info!(question_count = plan.questions.len(), "Research plan ready");
        Ok(plan)
    }

    fn parse_depth(raw: &str) -> ResearchDepth {
        match raw.trim().to_lowercase().as_str() {
            "shallow" => ResearchDepth::Shallow,
            "deep" => ResearchDepth::Deep,
            _ => ResearchDepth::Moderate,
        }
    }

    /// Deterministic plan used when the model's response cannot be parsed.
    fn template_plan(topic: &str) -> PlanRaw {
        PlanRaw {
            questions: vec![
                format!("What is {}?", topic),
                format!("What is the current state of {}?", topic),
                format!("What are the main challenges and limitations of {}?", topic),
                format!("What recent developments have shaped {}?", topic),
                format!("What is the likely future direction of {}?", topic),
            ],
            approach: format!("Survey background, current state, and outlook for {}", topic),
            estimated_depth: "moderate".to_string(),
        }
    }

    fn create_plan_prompt(topic: &str) -> String {
        format!(
            r#"Create a research plan for the following topic.

TOPIC:
{topic}

Produce between {min} and {max} specific research questions that together
cover the topic: background, current state, key challenges, notable
developments, and outlook.

OUTPUT FORMAT (respond with ONLY valid JSON):
{{
  "questions": [
    "Question 1",
    "Question 2"
  ],
  "approach": "One-paragraph description of the research approach",
  "estimated_depth": "shallow | moderate | deep"
}}

IMPORTANT:
- Each question must be answerable through web research
- Questions should not overlap
- Respond with ONLY the JSON object"#,
            topic = topic,
            min = MIN_QUESTIONS,
            max = MAX_QUESTIONS,
        )
    }
}
