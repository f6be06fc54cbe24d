//! Agent System
//!
//! This module contains the five research agents that power the report
//! pipeline:
//!
//! - **Planner**: Turns a topic into 5-7 research questions and an approach
//! - **Researcher**: Searches the web per question and synthesizes answers
//! - **Critic**: Audits the findings for gaps, biases, and contradictions
//! - **Writer**: Drafts the markdown report from findings and critique
//! - **Reviewer**: Polishes the draft and scores readability
//!
//! ## Pipeline Overview
//!
//! ```text
//! Topic
//!   │
//!   ▼
//! ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ Planner  │ → │ Researcher │ → │  Critic  │ → │  Writer  │ → │ Reviewer │
//! └──────────┘   └────────────┘   └──────────┘   └──────────┘   └──────────┘
//!   plan            findings         critique       draft        final report
//! ```
//!
//! Each agent is a stateless transformation over injected capabilities; the
//! workflow engine owns sequencing, persistence, and phase-level retry.

pub mod critic;
pub mod planner;
pub mod researcher;
pub mod reviewer;
pub mod writer;

pub use critic::Critic;
pub use planner::Planner;
pub use researcher::{ResearchMode, Researcher};
pub use reviewer::{ReviewOutcome, Reviewer};
pub use writer::Writer;

/// Confidence used when a model reports nothing usable.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Normalize a model-reported confidence into [0, 1].
///
/// Models asked for a 0-1 value sometimes answer on a 0-100 scale; values
/// above 1 are divided by 100 first. Anything still outside [0, 1] (or NaN)
/// becomes the default.
pub fn normalize_confidence(raw: f64) -> f64 {
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    if scaled.is_nan() || !(0.0..=1.0).contains(&scaled) {
        DEFAULT_CONFIDENCE
    } else {
        scaled
    }
}
