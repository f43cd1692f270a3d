//! Provider trait definitions for LLM API clients

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::runner::rate_limiter::RateLimiter;

/// System prompt sent by every provider
pub const SYSTEM_PROMPT: &str =
    "You are an expert CV analyst with deep knowledge of recruitment and talent assessment.";

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling options for one (pipeline, model) combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub model_id: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationOptions {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            temperature: 1.0,
            max_tokens: 2000,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Request for a completion from an LLM provider
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: None,
            messages,
            max_tokens,
            temperature: None,
            system_prompt: None,
        }
    }

    /// Single-prompt request carrying the run's generation options
    pub fn from_prompt(prompt: impl Into<String>, options: &GenerationOptions) -> Self {
        Self::new(vec![Message::user(prompt)], options.max_tokens)
            .with_model(&options.model_id)
            .with_temperature(options.temperature)
            .with_system(SYSTEM_PROMPT)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Rough token budget for rate limiting: about four characters per
    /// input token, plus the full completion allowance
    pub fn estimated_tokens(&self) -> u32 {
        let chars: usize = self.messages.iter().map(|m| m.content.len()).sum::<usize>()
            + self.system_prompt.as_ref().map_or(0, String::len);
        let input = u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX);
        input.saturating_add(self.max_tokens)
    }

    /// Text of the last user message
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: String,
    pub latency_ms: u64,
}

impl CompletionResponse {
    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            calls: 1,
            input_tokens: self.input_tokens as u64,
            output_tokens: self.output_tokens as u64,
        }
    }
}

/// Token usage summed over one or more provider calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub calls: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.calls += other.calls;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Coarse classification of provider failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    RateLimit,
    InvalidResponse,
    Auth,
    Cancelled,
    Other,
}

/// Error types for provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Timeout { .. } => ProviderErrorKind::Timeout,
            ProviderError::Http(e) if e.is_timeout() => ProviderErrorKind::Timeout,
            ProviderError::RateLimited { .. } => ProviderErrorKind::RateLimit,
            ProviderError::InvalidResponse(_) => ProviderErrorKind::InvalidResponse,
            ProviderError::Auth(_) | ProviderError::Config(_) => ProviderErrorKind::Auth,
            ProviderError::Cancelled(_) => ProviderErrorKind::Cancelled,
            ProviderError::Http(_) | ProviderError::Api { .. } => ProviderErrorKind::Other,
        }
    }

    /// Worth retrying: timeouts, rate limits, transport failures, 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout { .. } | ProviderError::RateLimited { .. } => true,
            ProviderError::Http(_) => true,
            ProviderError::Api { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }

    /// No call in the run can succeed after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProviderError::Auth(_) | ProviderError::Config(_))
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Get the provider name (e.g., "anthropic", "openai", "gemini")
    fn name(&self) -> &str;

    /// Get the default model for this provider
    fn default_model(&self) -> &str;

    /// Send a completion request
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse>;

    /// Get the rate limiter for this provider
    fn rate_limiter(&self) -> &Arc<RateLimiter>;
}
