//! Writer Agent
//!
//! Drafts the markdown report from the findings and the critique. The draft
//! must be non-trivial; missing section headings are worth a warning but
//! not a failure.

use crate::llm::{Generation, GenerationRequest};
use crate::models::{Critique, FindingsArtifact};
use crate::types::{AppError, AppResult, QualityTier};
use tracing::{info, warn};

/// A draft shorter than this is treated as a failed write.
pub const MIN_DRAFT_CHARS: usize = 200;

const EXPECTED_HEADINGS: [&str; 2] = ["introduction", "conclusion"];

pub struct Writer;

impl Writer {
    pub async fn compose(
        topic: &str,
        findings: &FindingsArtifact,
        critique: Option<&Critique>,
        tier: QualityTier,
        generation: &dyn Generation,
    ) -> AppResult<String> {
        info!(topic = %topic, finding_count = findings.findings.len(), "Drafting report");

        let request = GenerationRequest::new(
            Self::create_draft_prompt(topic, findings, critique),
            tier,
        )
        .with_system(
            "You are a technical writer producing well-structured markdown research \
             reports with inline source citations.",
        )
        .with_temperature(0.7);

        let draft = generation.generate(&request).await?;
        let draft = draft.trim().to_string();

        if draft.chars().count() < MIN_DRAFT_CHARS {
            return Err(AppError::EmptyArtifact(format!(
                "draft is {} characters, expected at least {}",
                draft.chars().count(),
                MIN_DRAFT_CHARS
            )));
        }

        let lower = draft.to_lowercase();
        let missing: Vec<&str> = EXPECTED_HEADINGS
            .iter()
            .filter(|h| !lower.contains(*h))
            .copied()
            .collect();
        if !missing.is_empty() {
            warn!(missing = ?missing, "Draft is missing expected section headings");
        }

        info!(draft_len = draft.len(), "Draft complete");
        Ok(draft)
    }

    fn create_draft_prompt(
        topic: &str,
        findings: &FindingsArtifact,
        critique: Option<&Critique>,
    ) -> String {
        let mut findings_block = String::new();
        for finding in &findings.findings {
            findings_block.push_str(&format!("### {}\n{}\n\nSources:\n", finding.question, finding.answer));
            for source in &finding.sources {
                findings_block.push_str(&format!("- {} ({})\n", source.title, source.url));
            }
            findings_block.push('\n');
        }

        let critique_block = match critique {
            Some(c) => {
                let mut block = format!("Overall assessment: {}\n", c.overall_assessment);
                if !c.gaps.is_empty() {
                    block.push_str(&format!("Known gaps: {}\n", c.gaps.join("; ")));
                }
                if !c.suggestions.is_empty() {
                    block.push_str(&format!("Suggestions: {}\n", c.suggestions.join("; ")));
                }
                block
            }
            None => "No critique available.".to_string(),
        };

        format!(
            r#"Write a research report on "{topic}" in markdown.

RESEARCH FINDINGS:
{findings_block}
CRITIQUE OF THE FINDINGS:
{critique_block}

REQUIREMENTS:
- Start with a title (# heading) and an introduction
- One section per major theme, synthesized across findings (do not copy the
  question/answer structure verbatim)
- Acknowledge the critique's gaps honestly where relevant
- Cite sources inline as markdown links
- End with a conclusion section
- Aim for 800-1500 words

Respond with ONLY the markdown report."#,
            topic = topic,
            findings_block = findings_block,
            critique_block = critique_block,
        )
    }
}
