//! Generation capability.
//!
//! The narrow, retry-wrapped interface the agents consume. Everything above
//! this layer is written against the `Generation` trait so tests can inject
//! deterministic fakes instead of a live provider.

use crate::config::LlmConfig;
use crate::llm::provider::{LLMProviderConfig, LLM};
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, QualityTier};
use crate::utils::retry::{retry_with_policy, RetryPolicy};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub tier: QualityTier,
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, tier: QualityTier) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.7,
            tier,
            max_tokens: Some(2048),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
pub trait Generation: Send + Sync {
    /// Generate text for a prompt. Implementations own transient-failure
    /// retry; an error here means the bound was exhausted.
    async fn generate(&self, request: &GenerationRequest) -> AppResult<String>;
}

/// Production implementation: provider adapter + bounded retry with
/// exponential backoff. Tier picks the backing model and nothing else.
pub struct GenerationClient {
    llm: LLM,
    fast_model: String,
    premium_model: String,
    retry: RetryPolicy,
}

impl GenerationClient {
    pub fn new(llm: LLM, fast_model: String, premium_model: String, retry: RetryPolicy) -> Self {
        Self {
            llm,
            fast_model,
            premium_model,
            retry,
        }
    }

    pub fn from_config(config: &LlmConfig) -> AppResult<Self> {
        let api_key = config
            .active_api_key()
            .ok_or_else(|| AppError::Internal(format!("no API key for provider {}", config.provider)))?;

        let llm = LLM::new(LLMProviderConfig {
            name: config.provider.clone(),
            api_key,
        })?;

        Ok(Self::new(
            llm,
            config.fast_model.clone(),
            config.premium_model.clone(),
            RetryPolicy::new(config.max_retries, std::time::Duration::from_millis(500)),
        ))
    }

    fn model_for(&self, tier: QualityTier) -> &str {
        match tier {
            QualityTier::Fast => &self.fast_model,
            QualityTier::Premium => &self.premium_model,
        }
    }
}

#[async_trait]
impl Generation for GenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> AppResult<String> {
        let llm_request = LLMRequest {
            model: self.model_for(request.tier).to_string(),
            messages: vec![LLMMessage::user(&request.prompt)],
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            system_instruction: request.system.clone(),
        };

        let result = retry_with_policy(self.retry, || async {
            self.llm.create_chat_completion(&llm_request).await
        })
        .await;

        match result {
            Ok(response) => Ok(response.content),
            Err(last) => Err(AppError::LLMApi(format!(
                "generation failed after {} attempts: {}",
                self.retry.max_attempts, last
            ))),
        }
    }
}
