//! Configuration management for ranking runs
//!
//! Loads provider and run settings from TOML files. The loaded value is
//! passed explicitly into the executor and pipelines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::pipelines::{CriteriaBatching, PipelineKind};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Provider-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub default_model: String,
    /// Models evaluated when `--models` is not given
    #[serde(default)]
    pub models: Vec<String>,
    /// Requests per minute
    #[serde(default = "default_rpm")]
    pub rpm: u32,
    /// Tokens per minute
    #[serde(default = "default_tpm")]
    pub tpm: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Run execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experiment_name: Option<String>,
    #[serde(default = "default_pipelines")]
    pub pipelines: Vec<PipelineKind>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_parallel_requests")]
    pub parallel_requests: usize,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    #[serde(default)]
    pub criteria_batching: CriteriaBatching,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    #[serde(default = "default_true")]
    pub write_rankings_text: bool,
    #[serde(default = "default_true")]
    pub write_csv: bool,
}

// Default value functions
fn default_true() -> bool { true }
fn default_rpm() -> u32 { 60 }
fn default_tpm() -> u32 { 100_000 }
fn default_pipelines() -> Vec<PipelineKind> { PipelineKind::all() }
fn default_temperature() -> f32 { 1.0 }
fn default_max_tokens() -> u32 { 2000 }
fn default_parallel_requests() -> usize { 4 }
fn default_retry_count() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_max_retry_delay_ms() -> u64 { 60_000 }
fn default_timeout_ms() -> u64 { 120_000 }
fn default_results_dir() -> String { "results".to_string() }

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            experiment_name: None,
            pipelines: default_pipelines(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            parallel_requests: default_parallel_requests(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            timeout_ms: default_timeout_ms(),
            deadline_secs: None,
            criteria_batching: CriteriaBatching::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            write_rankings_text: true,
            write_csv: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from the first default config location, or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = [
            "config/ranking.toml",
            "../config/ranking.toml",
            "cv-ranking/config/ranking.toml",
        ];

        for path in &config_paths {
            if !Path::new(path).exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path);
                    return config;
                }
                Err(e) => tracing::warn!("Ignoring {}: {}", path, e),
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Get enabled providers
    pub fn enabled_providers(&self) -> Vec<&ProviderConfig> {
        self.providers.values().filter(|p| p.enabled).collect()
    }

    /// Get a specific provider config
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = BTreeMap::new();

        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                name: "openai".to_string(),
                enabled: true,
                default_model: "gpt-4o".to_string(),
                models: vec!["gpt-4o".to_string()],
                rpm: 500,
                tpm: 200_000,
                base_url: None,
            },
        );
        providers.insert(
            "anthropic".to_string(),
            ProviderConfig {
                name: "anthropic".to_string(),
                enabled: true,
                default_model: "claude-sonnet-4-5-20250929".to_string(),
                models: vec!["claude-sonnet-4-5-20250929".to_string()],
                rpm: 1_000,
                tpm: 450_000,
                base_url: None,
            },
        );
        providers.insert(
            "gemini".to_string(),
            ProviderConfig {
                name: "gemini".to_string(),
                enabled: false,
                default_model: "gemini-1.5-pro".to_string(),
                models: vec!["gemini-1.5-pro".to_string()],
                rpm: 60,
                tpm: 1_000_000,
                base_url: None,
            },
        );

        Self {
            providers,
            run: RunConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.providers.contains_key("anthropic"));
        assert!(config.providers.contains_key("openai"));
        assert!(!config.providers["gemini"].enabled);
        assert_eq!(config.run.temperature, 1.0);
        assert_eq!(config.run.max_tokens, 2000);
        assert_eq!(config.run.pipelines, PipelineKind::all());
    }

    #[test]
    fn test_parse_toml_config() {
        let toml = r#"
[providers.test]
name = "test"
default_model = "test-model"
rpm = 100
tpm = 50000
base_url = "http://localhost:8080/v1"

[run]
experiment_name = "pilot"
pipelines = ["one_shot", "decomposed_algorithmic"]
temperature = 0.2
criteria_batching = "per_criterion"
deadline_secs = 600

[output]
write_csv = false
"#;
        let config = Config::from_toml(toml).unwrap();
        let provider = &config.providers["test"];
        assert!(provider.enabled);
        assert_eq!(provider.base_url.as_deref(), Some("http://localhost:8080/v1"));
        assert!(provider.models.is_empty());

        assert_eq!(config.run.experiment_name.as_deref(), Some("pilot"));
        assert_eq!(
            config.run.pipelines,
            vec![PipelineKind::OneShot, PipelineKind::DecomposedAlgorithmic]
        );
        assert_eq!(config.run.criteria_batching, CriteriaBatching::PerCriterion);
        assert_eq!(config.run.deadline_secs, Some(600));
        assert_eq!(config.run.retry_count, 3);
        assert!(!config.output.write_csv);
        assert_eq!(config.output.results_dir, "results");
    }

    #[test]
    fn test_unknown_pipeline_rejected() {
        let err = Config::from_toml("[run]\npipelines = [\"two_shot\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranking.toml");
        let config = Config::default();
        config.save_toml(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }
}
