use std::time::Duration;

use serde::Deserialize;
use snapsolve_llm::provider::{DefaultModels, ProviderConfig};

use crate::secret::Secret;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub models: ModelSettings,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_provider_id() -> String {
    "ollama".into()
}

fn default_chat_timeout() -> u64 {
    60
}

fn default_validate_timeout() -> u64 {
    5
}

fn default_discovery_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_id")]
    pub id: String,
    #[serde(default)]
    pub api_key: Option<Secret>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_chat_timeout")]
    pub chat_timeout_secs: u64,
    #[serde(default = "default_validate_timeout")]
    pub validate_timeout_secs: u64,
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            id: default_provider_id(),
            api_key: None,
            base_url: None,
            chat_timeout_secs: default_chat_timeout(),
            validate_timeout_secs: default_validate_timeout(),
            discovery_timeout_secs: default_discovery_timeout(),
        }
    }
}

/// Model id per pipeline stage. Empty slots resolve to the provider's default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub extraction: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub debugging: String,
}

fn default_language() -> String {
    "python".into()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_temperature")]
    pub extraction_temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub extraction_max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub solution_temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub solution_max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            extraction_temperature: default_temperature(),
            extraction_max_tokens: default_max_tokens(),
            solution_temperature: default_temperature(),
            solution_max_tokens: default_max_tokens(),
        }
    }
}

/// Per-backend model defaults: `(extraction, solution, debugging)`.
fn builtin_default_models(provider_id: &str) -> (&'static str, &'static str, &'static str) {
    match provider_id {
        "openai" => ("gpt-4o-mini", "gpt-4o", "gpt-4o"),
        "openrouter" => ("openai/gpt-4o-mini", "openai/gpt-4o", "openai/gpt-4o"),
        "anthropic" => (
            "claude-3-5-haiku-20241022",
            "claude-sonnet-4-20250514",
            "claude-sonnet-4-20250514",
        ),
        "gemini" => ("gemini-2.5-flash", "gemini-2.5-pro", "gemini-2.5-pro"),
        "compatible" => ("local-model", "local-model", "local-model"),
        _ => ("llava", "qwen2.5-coder", "qwen2.5-coder"),
    }
}

impl Config {
    /// Stage models with empty slots filled from the provider's defaults.
    #[must_use]
    pub fn resolved_models(&self) -> DefaultModels {
        let (extraction, solution, debugging) = builtin_default_models(&self.provider.id);
        let pick = |configured: &str, fallback: &str| {
            if configured.trim().is_empty() {
                fallback.to_owned()
            } else {
                configured.trim().to_owned()
            }
        };
        DefaultModels {
            extraction: pick(&self.models.extraction, extraction),
            solution: pick(&self.models.solution, solution),
            debugging: pick(&self.models.debugging, debugging),
        }
    }

    /// Connection parameters for instantiating the configured adapter.
    #[must_use]
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self
                .provider
                .api_key
                .as_ref()
                .map(|s| s.expose().trim().to_owned())
                .unwrap_or_default(),
            base_url: self
                .provider
                .base_url
                .clone()
                .filter(|u| !u.trim().is_empty()),
            default_models: self.resolved_models(),
            chat_timeout: Duration::from_secs(self.provider.chat_timeout_secs),
            validate_timeout: Duration::from_secs(self.provider.validate_timeout_secs),
        }
    }

    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.discovery_timeout_secs)
    }
}
