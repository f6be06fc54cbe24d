// Type definitions and enums

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Quality tier for text generation: cost-optimized vs. quality-optimized
/// backing model. Tier selection never changes retry/backoff behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Fast,
    Premium,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant", "system"
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Cannot cancel: {0}")]
    CannotCancel(String),

    /// An agent produced semantically empty output (no questions, no sources
    /// for any question). Distinguishable from a capability failure.
    #[error("Empty artifact: {0}")]
    EmptyArtifact(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Classified, user-safe message. Internal capability error text is never
    /// exposed verbatim at the request boundary.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "internal error".to_string(),
            AppError::LLMApi(_) => "text generation failed".to_string(),
            AppError::Search(_) => "web search failed".to_string(),
            AppError::Auth(_) => "unauthorized".to_string(),
            AppError::NotFound(_) => "not found".to_string(),
            AppError::InvalidRequest(msg) => msg.clone(),
            AppError::InsufficientCredits => "insufficient credits".to_string(),
            AppError::CannotCancel(msg) => msg.clone(),
            AppError::EmptyArtifact(_) => "internal error".to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) | AppError::EmptyArtifact(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::LLMApi(_) | AppError::Search(_) => StatusCode::BAD_GATEWAY,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            AppError::CannotCancel(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Full diagnostic detail stays server-side.
        tracing::error!(error = %self, "request failed");

        let body = serde_json::json!({ "error": self.public_message() });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_message_hides_internal_detail() {
        let err = AppError::LLMApi("connection reset by api.example.com:443".to_string());
        assert_eq!(err.public_message(), "text generation failed");

        let err = AppError::Internal("stack trace included".to_string());
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn test_public_message_keeps_validation_text() {
        let err = AppError::InvalidRequest("topic must be 3-500 characters".to_string());
        assert_eq!(err.public_message(), "topic must be 3-500 characters");
    }
}
