mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::Context;

pub const MAX_VALIDATE_TIMEOUT_SECS: u64 = 5;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            Self::parse(&content)?
        } else {
            tracing::debug!("config file {} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse TOML without applying env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid config TOML.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str::<Self>(content).context("failed to parse config file")
    }

    /// Check value ranges that serde cannot express.
    ///
    /// Whether the provider id is registered is checked when the adapter is built.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provider.id.trim().is_empty() {
            anyhow::bail!("provider.id must not be empty");
        }
        if self.provider.chat_timeout_secs == 0 {
            anyhow::bail!("provider.chat_timeout_secs must be greater than zero");
        }
        if self.provider.validate_timeout_secs == 0
            || self.provider.validate_timeout_secs > MAX_VALIDATE_TIMEOUT_SECS
        {
            anyhow::bail!(
                "provider.validate_timeout_secs must be between 1 and {MAX_VALIDATE_TIMEOUT_SECS}"
            );
        }
        if let Some(url) = self.provider.base_url.as_deref().filter(|u| !u.trim().is_empty())
            && !snapsolve_llm::http::is_http_url(url)
        {
            anyhow::bail!("provider.base_url must be an absolute http(s) URL, got {url:?}");
        }
        if self.provider.id == "compatible"
            && self
                .provider
                .base_url
                .as_deref()
                .is_none_or(|u| u.trim().is_empty())
        {
            tracing::warn!(
                "compatible provider without base_url, using {}",
                snapsolve_llm::compatible::DEFAULT_BASE_URL
            );
        }
        for (name, t) in [
            ("extraction_temperature", self.pipeline.extraction_temperature),
            ("solution_temperature", self.pipeline.solution_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                anyhow::bail!("pipeline.{name} must be within 0.0..=2.0, got {t}");
            }
        }
        if self.pipeline.extraction_max_tokens == 0 || self.pipeline.solution_max_tokens == 0 {
            anyhow::bail!("pipeline max_tokens values must be greater than zero");
        }
        if self.pipeline.language.trim().is_empty() {
            anyhow::bail!("pipeline.language must not be empty");
        }
        Ok(())
    }
}
