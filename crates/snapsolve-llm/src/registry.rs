//! Provider factories keyed by stable id.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use crate::any::AnyProvider;
use crate::claude::ClaudeProvider;
use crate::compatible::CompatibleProvider;
use crate::error::LlmError;
use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::openrouter::OpenRouterProvider;
use crate::provider::{LlmProvider, ModelInfo, ProviderConfig, ProviderDescriptor};

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

pub type ProviderFactory = Arc<dyn Fn(ProviderConfig) -> AnyProvider + Send + Sync>;

/// One entry of [`ProviderRegistry::all_providers_with_details`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDetails {
    pub descriptor: ProviderDescriptor,
    pub models: Vec<ModelInfo>,
}

/// Maps provider ids to factories. Registration order is preserved for listings.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: Vec<(String, ProviderFactory)>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("ids", &self.provider_ids())
            .finish()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the six built-in adapters.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_provider("ollama", |c| OllamaProvider::new(c).into());
        registry.register_provider("compatible", |c| CompatibleProvider::new(c).into());
        registry.register_provider("openai", |c| OpenAiProvider::new(c).into());
        registry.register_provider("openrouter", |c| OpenRouterProvider::new(c).into());
        registry.register_provider("anthropic", |c| ClaudeProvider::new(c).into());
        registry.register_provider("gemini", |c| GeminiProvider::new(c).into());
        registry
    }

    /// Add or replace the factory for `id`.
    pub fn register_provider<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(ProviderConfig) -> AnyProvider + Send + Sync + 'static,
    {
        let id = id.into();
        let factory: ProviderFactory = Arc::new(factory);
        if let Some(slot) = self.factories.iter_mut().find(|(k, _)| *k == id) {
            tracing::debug!(provider = %id, "replacing registered provider factory");
            slot.1 = factory;
        } else {
            self.factories.push((id, factory));
        }
    }

    /// # Errors
    ///
    /// Returns [`LlmError::UnknownProvider`] if no factory is registered under `id`.
    pub fn create_provider(&self, id: &str, config: ProviderConfig) -> Result<AnyProvider, LlmError> {
        self.factories
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, factory)| factory(config))
            .ok_or_else(|| LlmError::UnknownProvider(id.to_owned()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.factories.iter().any(|(k, _)| k == id)
    }

    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        self.factories.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Descriptors of every registered adapter, without network I/O.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.factories
            .iter()
            .map(|(_, factory)| factory(ProviderConfig::default()).descriptor().clone())
            .collect()
    }

    /// Instantiate every adapter with a placeholder config and list its models
    /// concurrently. An adapter that exceeds `discovery_timeout` gets an empty list.
    pub async fn all_providers_with_details(
        &self,
        discovery_timeout: Duration,
    ) -> Vec<ProviderDetails> {
        let providers: Vec<AnyProvider> = self
            .factories
            .iter()
            .map(|(_, factory)| factory(ProviderConfig::default()))
            .collect();

        join_all(providers.iter().map(|provider| async move {
            let models = tokio::time::timeout(discovery_timeout, provider.available_models())
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!(
                        provider = provider.id(),
                        "model discovery timed out after {}s",
                        discovery_timeout.as_secs()
                    );
                    Vec::new()
                });
            ProviderDetails {
                descriptor: provider.descriptor().clone(),
                models,
            }
        }))
        .await
    }
}
