use crate::config::Config;
use crate::db::store::RunStore;
use crate::engine::WorkflowEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RunStore>,
    pub engine: Arc<WorkflowEngine>,
    pub config: Config,
}

/// Current artifact schema version. Bump when an artifact's shape changes so
/// stored JSONB can be told apart from older runs.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// Lifecycle status of a report run.
///
/// Progression is strictly forward through the non-terminal values;
/// `Failed` and `Cancelled` are reachable from any non-terminal state.
/// Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Planning,
    Researching,
    Critiquing,
    Writing,
    Formatting,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }

    /// Position in the forward chain. Terminal states share the top slot so
    /// that any observed sequence can be checked for monotonicity.
    pub fn rank(&self) -> u8 {
        match self {
            RunStatus::Pending => 0,
            RunStatus::Planning => 1,
            RunStatus::Researching => 2,
            RunStatus::Critiquing => 3,
            RunStatus::Writing => 4,
            RunStatus::Formatting => 5,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Planning => "planning",
            RunStatus::Researching => "researching",
            RunStatus::Critiquing => "critiquing",
            RunStatus::Writing => "writing",
            RunStatus::Formatting => "formatting",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "planning" => Some(RunStatus::Planning),
            "researching" => Some(RunStatus::Researching),
            "critiquing" => Some(RunStatus::Critiquing),
            "writing" => Some(RunStatus::Writing),
            "formatting" => Some(RunStatus::Formatting),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    Shallow,
    Moderate,
    Deep,
}

/// Artifact written by the planning phase.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResearchPlan {
    pub questions: Vec<String>,
    pub approach: String,
    pub estimated_depth: ResearchDepth,
    pub schema_version: u32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Finding {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    /// Always in [0, 1] after normalization.
    pub confidence: f64,
    pub gathered_at: chrono::DateTime<chrono::Utc>,
}

/// Artifact written by the research phase.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FindingsArtifact {
    pub findings: Vec<Finding>,
    pub summary: String,
    pub schema_version: u32,
}

impl FindingsArtifact {
    pub fn source_count(&self) -> usize {
        self.findings.iter().map(|f| f.sources.len()).sum()
    }
}

/// Artifact written by the critique phase.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Critique {
    pub confidence: f64,
    pub gaps: Vec<String>,
    pub biases: Vec<String>,
    pub contradictions: Vec<String>,
    pub suggestions: Vec<String>,
    pub overall_assessment: String,
    pub schema_version: u32,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ChangeCounts {
    pub grammar: u32,
    pub clarity: u32,
    pub structure: u32,
    pub accuracy: u32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReviewSummary {
    pub changes: ChangeCounts,
    /// 0-100
    pub readability_score: u8,
    pub overall_quality: String,
}

/// Artifact written by the review phase alongside the final report.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReportMetadata {
    pub review: ReviewSummary,
    pub word_count: usize,
    pub source_count: usize,
    pub schema_version: u32,
}

/// The durable record one workflow run reads and writes. Mutated only by the
/// engine (phase status + artifacts), the cancel handler, and the creation
/// transaction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReportRun {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub topic: String,
    pub status: RunStatus,
    pub research_plan: Option<ResearchPlan>,
    pub findings: Option<FindingsArtifact>,
    pub critique: Option<Critique>,
    pub final_report: Option<String>,
    pub report_metadata: Option<ReportMetadata>,
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Summary projection for run listings.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    pub id: uuid::Uuid,
    pub topic: String,
    pub status: RunStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&ReportRun> for RunSummary {
    fn from(run: &ReportRun) -> Self {
        Self {
            id: run.id,
            topic: run.topic.clone(),
            status: run.status,
            created_at: run.created_at,
            completed_at: run.completed_at,
        }
    }
}

// API Request/Response types

#[derive(Debug, serde::Deserialize)]
pub struct StartReportRequest {
    pub topic: String,
}

#[derive(Debug, serde::Serialize)]
pub struct StartReportResponse {
    pub id: uuid::Uuid,
    pub status: RunStatus,
}

#[derive(Debug, serde::Serialize)]
pub struct CancelReportResponse {
    pub id: uuid::Uuid,
    pub status: RunStatus,
}

pub const TOPIC_MIN_CHARS: usize = 3;
pub const TOPIC_MAX_CHARS: usize = 500;

/// Sanitize a submitted topic: strip control characters, collapse runs of
/// whitespace, trim. Returns an error when the cleaned topic falls outside
/// the 3-500 character window.
pub fn sanitize_topic(raw: &str) -> Result<String, String> {
    let mut cleaned = String::with_capacity(raw.len());
    let mut last_was_space = true; // leading whitespace folds away

    for c in raw.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                cleaned.push(' ');
                last_was_space = true;
            }
        } else if c.is_control() {
            continue;
        } else {
            cleaned.push(c);
            last_was_space = false;
        }
    }

    let cleaned = cleaned.trim_end().to_string();
    let len = cleaned.chars().count();
    if len < TOPIC_MIN_CHARS || len > TOPIC_MAX_CHARS {
        return Err(format!(
            "topic must be {}-{} characters after sanitation",
            TOPIC_MIN_CHARS, TOPIC_MAX_CHARS
        ));
    }

    Ok(cleaned)
}
