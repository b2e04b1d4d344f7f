use std::fmt;

use crate::error::LlmError;
use crate::openai::OpenAiProvider;
use crate::provider::{
    ChatOptions, ChatResponse, ImageData, LlmProvider, Message, ModelInfo, ProviderConfig,
    ProviderDescriptor, SetupInstructions,
};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const APP_REFERER: &str = "https://github.com/snapsolve/snapsolve";
const APP_TITLE: &str = "snapsolve";

#[must_use]
pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: "openrouter".into(),
        display_name: "OpenRouter".into(),
        is_free: true,
        color_hint: "#6467f2".into(),
        requires_api_key: true,
        setup: SetupInstructions {
            signup_url: "https://openrouter.ai".into(),
            keys_url: Some("https://openrouter.ai/keys".into()),
            description: "One key for hundreds of models, several of them free. \
                          Pick a vision model for extraction."
                .into(),
        },
    }
}

fn fallback_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new("openai/gpt-4o", "OpenAI: GPT-4o", true).with_context_length(128_000),
        ModelInfo::new(
            "anthropic/claude-sonnet-4",
            "Anthropic: Claude Sonnet 4",
            true,
        )
        .with_context_length(200_000),
        ModelInfo::new("google/gemini-2.5-flash", "Google: Gemini 2.5 Flash", true)
            .with_context_length(1_048_576),
        ModelInfo::new(
            "meta-llama/llama-4-maverick:free",
            "Meta: Llama 4 Maverick (free)",
            true,
        )
        .with_context_length(128_000),
        ModelInfo::new("deepseek/deepseek-chat-v3-0324:free", "DeepSeek V3 (free)", false)
            .with_context_length(163_840),
    ]
}

/// Aggregator: OpenAI wire format plus attribution headers. Its `/models` listing
/// reports input modalities and context length per model. The listing is public,
/// so keys are checked against `/key` instead.
#[derive(Clone)]
pub struct OpenRouterProvider {
    inner: OpenAiProvider,
}

impl OpenRouterProvider {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        let inner = OpenAiProvider::with_identity(
            descriptor(),
            config,
            OPENROUTER_BASE_URL,
            fallback_models,
        )
        .with_header("HTTP-Referer", APP_REFERER)
        .with_header("X-Title", APP_TITLE);
        Self { inner }
    }
}

impl fmt::Debug for OpenRouterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterProvider")
            .field("inner", &self.inner)
            .finish()
    }
}

impl LlmProvider for OpenRouterProvider {
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
        if self.config().api_key.is_empty() {
            return false;
        }
        self.inner.key_accepted_by("/key").await
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_mock_server;

    #[tokio::test]
    async fn chat_sends_attribution_headers() {
        let server =
            spawn_mock_server(vec![(200, r#"{"choices":[{"message":{"content":"x"}}]}"#)])
                .await;
        let p = OpenRouterProvider::new(
            ProviderConfig::with_api_key("or-key").base_url(&server.base_url),
        );
        p.chat(&[Message::user("hi")], "openai/gpt-4o", ChatOptions::default())
            .await
            .unwrap();
        let req = &server.requests()[0];
        assert_eq!(req.header("http-referer"), Some(APP_REFERER));
        assert_eq!(req.header("x-title"), Some(APP_TITLE));
        assert_eq!(req.header("authorization"), Some("Bearer or-key"));
    }

    #[tokio::test]
    async fn listing_reads_modalities_and_context() {
        let server = spawn_mock_server(vec![(
            200,
            r#"{"data":[
                {"id":"a/vision","name":"A Vision","context_length":32000,
                 "architecture":{"input_modalities":["text","image"],"output_modalities":["text"]}},
                {"id":"b/text","name":"B Text","context_length":8000,
                 "architecture":{"input_modalities":["text"]}}
            ]}"#,
        )])
        .await;
        let p =
            OpenRouterProvider::new(ProviderConfig::with_api_key("k").base_url(&server.base_url));
        let models = p.available_models().await;
        assert_eq!(models.len(), 2);
        assert!(models[0].supports_vision);
        assert_eq!(models[0].context_length, Some(32000));
        assert!(!models[1].supports_vision);
        assert_eq!(server.requests()[0].path, "/models");
    }

    #[tokio::test]
    async fn listing_401_falls_back() {
        let server = spawn_mock_server(vec![(401, r#"{"error":"no auth"}"#)]).await;
        let p =
            OpenRouterProvider::new(ProviderConfig::with_api_key("k").base_url(&server.base_url));
        assert_eq!(p.available_models().await, fallback_models());
    }

    #[tokio::test]
    async fn key_is_checked_against_key_endpoint() {
        let server = spawn_mock_server(vec![(200, r#"{"data":{"label":"sk-or-v1-abc"}}"#)]).await;
        let p = OpenRouterProvider::new(
            ProviderConfig::with_api_key("or-key").base_url(&server.base_url),
        );
        assert!(p.validate_api_key().await);
        let req = &server.requests()[0];
        assert_eq!(req.path, "/key");
        assert_eq!(req.header("authorization"), Some("Bearer or-key"));
    }

    #[tokio::test]
    async fn rejected_key_fails_validation() {
        let server = spawn_mock_server(vec![(401, r#"{"error":{"message":"No auth"}}"#)]).await;
        let p =
            OpenRouterProvider::new(ProviderConfig::with_api_key("bad").base_url(&server.base_url));
        assert!(!p.validate_api_key().await);
    }

    #[tokio::test]
    async fn empty_key_fails_without_request() {
        let p = OpenRouterProvider::new(ProviderConfig::default().base_url("http://127.0.0.1:1"));
        assert!(!p.validate_api_key().await);
    }

    #[test]
    fn descriptor_requires_key() {
        assert!(descriptor().requires_api_key);
        assert_eq!(descriptor().id, "openrouter");
    }
}
