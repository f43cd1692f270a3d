//! LLM provider implementations

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod scripted;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAIClient;
pub use scripted::ScriptedProvider;
pub use traits::{
    CompletionRequest, CompletionResponse, GenerationOptions, LLMProvider, Message, ProviderError,
    ProviderErrorKind, ProviderResult, TokenUsage, SYSTEM_PROMPT,
};

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;

/// `retry-after` header in milliseconds, one minute when absent
pub(crate) fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(|secs| (secs.max(0.0) * 1000.0) as u64)
        .unwrap_or(60_000)
}

fn canonical_provider(name: &str) -> String {
    match name.trim().to_lowercase().as_str() {
        "claude" => "anthropic".to_string(),
        "gpt" => "openai".to_string(),
        "google" => "gemini".to_string(),
        other => other.to_string(),
    }
}

/// A `provider:model` pair. Without a model the provider's default is used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelTarget {
    pub provider: String,
    pub model: Option<String>,
}

impl ModelTarget {
    pub fn new(provider: &str, model: impl Into<String>) -> Self {
        Self {
            provider: canonical_provider(provider),
            model: Some(model.into()),
        }
    }
}

impl std::str::FromStr for ModelTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (provider, model) = match s.split_once(':') {
            Some((provider, model)) => (provider, Some(model.trim())),
            None => (s, None),
        };
        if provider.trim().is_empty() {
            return Err(format!("missing provider in '{}'", s));
        }
        if model.is_some_and(str::is_empty) {
            return Err(format!("missing model after ':' in '{}'", s));
        }
        Ok(Self {
            provider: canonical_provider(provider),
            model: model.map(str::to_string),
        })
    }
}

impl std::fmt::Display for ModelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{}:{}", self.provider, model),
            None => write!(f, "{}", self.provider),
        }
    }
}

/// A provider paired with the model it is asked for
#[derive(Clone)]
pub struct ModelEndpoint {
    pub provider: Arc<dyn LLMProvider>,
    pub model: String,
}

impl ModelEndpoint {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl std::fmt::Debug for ModelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider.name(), self.model)
    }
}

/// Create one provider client from the environment, applying config settings.
///
/// A missing API key is a `Config` error, raised before any call is made.
pub fn create_provider(name: &str, config: &Config) -> ProviderResult<Arc<dyn LLMProvider>> {
    let name = canonical_provider(name);
    let settings = config.get_provider(&name);

    let provider: Arc<dyn LLMProvider> = match name.as_str() {
        "openai" => {
            let mut client = OpenAIClient::from_env()?;
            if let Some(pc) = settings {
                client = client.with_rate_limits(pc.rpm, pc.tpm).with_model(&pc.default_model);
                if let Some(url) = &pc.base_url {
                    client = client.with_base_url(url);
                }
            }
            Arc::new(client)
        }
        "anthropic" => {
            let mut client = AnthropicClient::from_env()?;
            if let Some(pc) = settings {
                client = client.with_rate_limits(pc.rpm, pc.tpm).with_model(&pc.default_model);
                if let Some(url) = &pc.base_url {
                    client = client.with_base_url(url);
                }
            }
            Arc::new(client)
        }
        "gemini" => {
            let mut client = GeminiClient::from_env()?;
            if let Some(pc) = settings {
                client = client.with_rate_limits(pc.rpm, pc.tpm).with_model(&pc.default_model);
                if let Some(url) = &pc.base_url {
                    client = client.with_base_url(url);
                }
            }
            Arc::new(client)
        }
        other => return Err(ProviderError::Config(format!("Unknown provider: {}", other))),
    };

    Ok(provider)
}

/// Targets for every enabled provider in the config: each listed model, or
/// the default model when none are listed
pub fn configured_targets(config: &Config) -> Vec<ModelTarget> {
    config
        .enabled_providers()
        .into_iter()
        .flat_map(|pc| {
            let models = if pc.models.is_empty() {
                vec![pc.default_model.clone()]
            } else {
                pc.models.clone()
            };
            models.into_iter().map(move |model| ModelTarget::new(&pc.name, model))
        })
        .collect()
}

/// Resolve targets to endpoints. Targets naming the same provider share one
/// client, and so one rate limiter.
pub fn create_endpoints(targets: &[ModelTarget], config: &Config) -> ProviderResult<Vec<ModelEndpoint>> {
    let mut clients: HashMap<String, Arc<dyn LLMProvider>> = HashMap::new();
    let mut endpoints = Vec::with_capacity(targets.len());

    for target in targets {
        let provider = match clients.get(&target.provider) {
            Some(provider) => Arc::clone(provider),
            None => {
                let provider = create_provider(&target.provider, config)?;
                clients.insert(target.provider.clone(), Arc::clone(&provider));
                provider
            }
        };
        let model = target
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());
        endpoints.push(ModelEndpoint::new(provider, model));
    }

    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_target_parsing() {
        let target: ModelTarget = "Claude:claude-sonnet-4-5".parse().unwrap();
        assert_eq!(target.provider, "anthropic");
        assert_eq!(target.model.as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(target.to_string(), "anthropic:claude-sonnet-4-5");

        let bare: ModelTarget = "gemini".parse().unwrap();
        assert_eq!(bare.model, None);

        assert!("openai:".parse::<ModelTarget>().is_err());
        assert!(":gpt-4o".parse::<ModelTarget>().is_err());
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(retry_after_ms(&headers), 60_000);
        headers.insert("retry-after", "2".parse().unwrap());
        assert_eq!(retry_after_ms(&headers), 2_000);
        headers.insert("retry-after", "0.5".parse().unwrap());
        assert_eq!(retry_after_ms(&headers), 500);
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let err = create_provider("mistral", &Config::default()).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_configured_targets_expand_models() {
        let config = Config::from_toml(
            r#"
[providers.openai]
name = "openai"
default_model = "gpt-4o"
models = ["gpt-4o", "gpt-4o-mini"]

[providers.gemini]
name = "gemini"
enabled = false
default_model = "gemini-1.5-pro"
"#,
        )
        .unwrap();
        let targets = configured_targets(&config);
        assert_eq!(
            targets,
            vec![ModelTarget::new("openai", "gpt-4o"), ModelTarget::new("openai", "gpt-4o-mini")]
        );
    }
}
