use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub engine: EngineConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub openai_api_key: String,
    pub anthropic_api_key: String,
    /// Cost-optimized model used for planning and research synthesis.
    pub fast_model: String,
    /// Quality-optimized model used for writing and review.
    pub premium_model: String,
    pub max_retries: u32,
}

impl LlmConfig {
    pub fn active_api_key(&self) -> Option<String> {
        let key = match self.provider.as_str() {
            "openai" => &self.openai_api_key,
            "anthropic" => &self.anthropic_api_key,
            _ => return None,
        };
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub serpapi_key: String,
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Additional attempts after a phase's first failure.
    pub phase_retries: u32,
    pub phase_backoff_ms: u64,
    /// Pause between questions when the researcher runs sequentially.
    pub question_delay_ms: u64,
    pub sources_per_question: usize,
    pub parallel_research: bool,
}

impl EngineConfig {
    pub fn phase_backoff(&self) -> Duration {
        Duration::from_millis(self.phase_backoff_ms)
    }

    pub fn question_delay(&self) -> Duration {
        Duration::from_millis(self.question_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    pub mode: String,
    /// Credits granted to a user row created on first sight.
    pub initial_credits: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("DB_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()?,
            },
            llm: LlmConfig {
                provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
                openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
                fast_model: env::var("LLM_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                premium_model: env::var("LLM_PREMIUM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
                max_retries: env::var("LLM_MAX_RETRIES")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()?,
            },
            search: SearchConfig {
                serpapi_key: env::var("SERPAPI_KEY").unwrap_or_default(),
                max_results: env::var("SEARCH_MAX_RESULTS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
            },
            engine: EngineConfig {
                phase_retries: env::var("ENGINE_PHASE_RETRIES")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()?,
                phase_backoff_ms: env::var("ENGINE_PHASE_BACKOFF_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()?,
                question_delay_ms: env::var("RESEARCH_QUESTION_DELAY_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()?,
                sources_per_question: env::var("RESEARCH_SOURCES_PER_QUESTION")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
                parallel_research: env::var("RESEARCH_PARALLEL")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()?,
            },
            auth: AuthConfig {
                secret: env::var("DRAFTMILL_SECRET").expect("DRAFTMILL_SECRET must be set"),
                mode: env::var("AUTH_MODE").unwrap_or_else(|_| "jwt".to_string()),
                initial_credits: env::var("INITIAL_CREDITS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            },
        })
    }
}
