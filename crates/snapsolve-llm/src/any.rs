use crate::claude::ClaudeProvider;
use crate::compatible::CompatibleProvider;
use crate::error::LlmError;
use crate::gemini::GeminiProvider;
#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::openrouter::OpenRouterProvider;
use crate::provider::{
    ChatOptions, ChatResponse, ImageData, LlmProvider, Message, ModelInfo, ProviderConfig,
    ProviderDescriptor,
};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given closure for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::Ollama($p) => $expr,
            AnyProvider::Compatible($p) => $expr,
            AnyProvider::OpenAi($p) => $expr,
            AnyProvider::OpenRouter($p) => $expr,
            AnyProvider::Claude($p) => $expr,
            AnyProvider::Gemini($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

/// Closed set of adapters the registry can hand out.
#[derive(Debug, Clone)]
pub enum AnyProvider {
    Ollama(OllamaProvider),
    Compatible(CompatibleProvider),
    OpenAi(OpenAiProvider),
    OpenRouter(OpenRouterProvider),
    Claude(ClaudeProvider),
    Gemini(GeminiProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl LlmProvider for AnyProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        delegate_provider!(self, |p| p.descriptor())
    }

    fn config(&self) -> &ProviderConfig {
        delegate_provider!(self, |p| p.config())
    }

    async fn available_models(&self) -> Vec<ModelInfo> {
        delegate_provider!(self, |p| p.available_models().await)
    }

    async fn refresh_models(&self) -> Vec<ModelInfo> {
        delegate_provider!(self, |p| p.refresh_models().await)
    }

    async fn validate_api_key(&self) -> bool {
        delegate_provider!(self, |p| p.validate_api_key().await)
    }

    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        delegate_provider!(self, |p| p.chat(messages, model, options).await)
    }

    fn format_image(&self, image: &ImageData) -> serde_json::Value {
        delegate_provider!(self, |p| p.format_image(image))
    }

    fn supports_vision(&self, model: &str) -> bool {
        delegate_provider!(self, |p| p.supports_vision(model))
    }
}

impl From<OllamaProvider> for AnyProvider {
    fn from(p: OllamaProvider) -> Self {
        Self::Ollama(p)
    }
}

impl From<CompatibleProvider> for AnyProvider {
    fn from(p: CompatibleProvider) -> Self {
        Self::Compatible(p)
    }
}

impl From<OpenAiProvider> for AnyProvider {
    fn from(p: OpenAiProvider) -> Self {
        Self::OpenAi(p)
    }
}

impl From<OpenRouterProvider> for AnyProvider {
    fn from(p: OpenRouterProvider) -> Self {
        Self::OpenRouter(p)
    }
}

impl From<ClaudeProvider> for AnyProvider {
    fn from(p: ClaudeProvider) -> Self {
        Self::Claude(p)
    }
}

impl From<GeminiProvider> for AnyProvider {
    fn from(p: GeminiProvider) -> Self {
        Self::Gemini(p)
    }
}

#[cfg(feature = "mock")]
impl From<MockProvider> for AnyProvider {
    fn from(p: MockProvider) -> Self {
        Self::Mock(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed() -> ProviderConfig {
        ProviderConfig::with_api_key("secret-key")
    }

    #[test]
    fn descriptor_delegates() {
        let p = AnyProvider::from(ClaudeProvider::new(keyed()));
        assert_eq!(p.id(), "anthropic");
        let p = AnyProvider::from(GeminiProvider::new(keyed()));
        assert_eq!(p.id(), "gemini");
        let p = AnyProvider::from(OllamaProvider::new(ProviderConfig::default()));
        assert_eq!(p.id(), "ollama");
    }

    #[test]
    fn config_delegates() {
        let p = AnyProvider::from(OpenAiProvider::new(keyed()));
        assert_eq!(p.config().api_key, "secret-key");
    }

    #[test]
    fn debug_never_leaks_key() {
        for p in [
            AnyProvider::from(OpenAiProvider::new(keyed())),
            AnyProvider::from(OpenRouterProvider::new(keyed())),
            AnyProvider::from(ClaudeProvider::new(keyed())),
            AnyProvider::from(GeminiProvider::new(keyed())),
            AnyProvider::from(CompatibleProvider::new(keyed())),
        ] {
            assert!(!format!("{p:?}").contains("secret-key"));
        }
    }

    #[test]
    fn format_image_differs_per_backend() {
        let img = ImageData::png("QUJD");
        let ollama = AnyProvider::from(OllamaProvider::new(ProviderConfig::default()));
        let openai = AnyProvider::from(OpenAiProvider::new(keyed()));
        assert_eq!(ollama.format_image(&img), "QUJD");
        assert_eq!(openai.format_image(&img)["type"], "image_url");
    }

    #[test]
    fn clone_shares_identity() {
        let p = AnyProvider::from(GeminiProvider::new(keyed()));
        let cloned = p.clone();
        assert_eq!(cloned.descriptor(), p.descriptor());
    }

    #[tokio::test]
    async fn keyless_validation_delegates() {
        let p = AnyProvider::from(OllamaProvider::new(
            ProviderConfig::default().base_url("http://127.0.0.1:1"),
        ));
        assert!(p.validate_api_key().await);
    }
}
