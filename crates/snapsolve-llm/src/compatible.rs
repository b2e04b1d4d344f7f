use std::fmt;

use crate::error::LlmError;
use crate::openai::OpenAiProvider;
use crate::provider::{
    ChatOptions, ChatResponse, ImageData, LlmProvider, Message, ModelInfo, ProviderConfig,
    ProviderDescriptor, SetupInstructions,
};

/// LM Studio's default listen address; override via `base_url`.
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";

#[must_use]
pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: "compatible".into(),
        display_name: "OpenAI-compatible endpoint".into(),
        is_free: true,
        color_hint: "#6b7280".into(),
        requires_api_key: false,
        setup: SetupInstructions {
            signup_url: "https://lmstudio.ai".into(),
            keys_url: None,
            description: "Any server speaking the OpenAI chat completions API \
                          (LM Studio, vLLM, LiteLLM, self-hosted proxies). Set the base URL; \
                          the key is optional."
                .into(),
        },
    }
}

fn fallback_models() -> Vec<ModelInfo> {
    vec![ModelInfo::new("local-model", "Loaded model", true)
        .with_description("Whatever model the endpoint currently serves")]
}

/// Generic relay: OpenAI wire format at a user-supplied base URL, key optional.
#[derive(Clone)]
pub struct CompatibleProvider {
    inner: OpenAiProvider,
}

impl CompatibleProvider {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            inner: OpenAiProvider::with_identity(
                descriptor(),
                config,
                DEFAULT_BASE_URL,
                fallback_models,
            ),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.inner.base_url()
    }
}

impl fmt::Debug for CompatibleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompatibleProvider")
            .field("inner", &self.inner)
            .finish()
    }
}

impl LlmProvider for CompatibleProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        self.inner.descriptor()
    }

    fn config(&self) -> &ProviderConfig {
        self.inner.config()
    }

    async fn available_models(&self) -> Vec<ModelInfo> {
        self.inner.available_models().await
    }

    async fn refresh_models(&self) -> Vec<ModelInfo> {
        self.inner.refresh_models().await
    }

    async fn validate_api_key(&self) -> bool {
        self.inner.validate_api_key().await
    }

    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        self.inner.chat(messages, model, options).await
    }

    fn format_image(&self, image: &ImageData) -> serde_json::Value {
        self.inner.format_image(image)
    }

    fn supports_vision(&self, model: &str) -> bool {
        self.inner.supports_vision(model)
    }
}
