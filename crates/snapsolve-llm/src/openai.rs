use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::ModelCache;
use crate::error::LlmError;
use crate::http::{read_json, read_success_body, transport_error};
use crate::provider::{
    ChatOptions, ChatResponse, ImageData, LlmProvider, Message, MessagePart, ModelInfo,
    ProviderConfig, ProviderDescriptor, SetupInstructions, Usage, validate_messages,
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[must_use]
pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: "openai".into(),
        display_name: "OpenAI".into(),
        is_free: false,
        color_hint: "#10a37f".into(),
        requires_api_key: true,
        setup: SetupInstructions {
            signup_url: "https://platform.openai.com/signup".into(),
            keys_url: Some("https://platform.openai.com/api-keys".into()),
            description: "Direct access to GPT models. Vision-capable models read screenshots."
                .into(),
        },
    }
}

fn fallback_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new("gpt-4o", "GPT-4o", true).with_context_length(128_000),
        ModelInfo::new("gpt-4o-mini", "GPT-4o mini", true).with_context_length(128_000),
        ModelInfo::new("gpt-4.1", "GPT-4.1", true).with_context_length(1_047_576),
        ModelInfo::new("o4-mini", "o4-mini", true).with_context_length(200_000),
    ]
}

/// Speaks the `/chat/completions` + `/models` wire format.
///
/// Also the transport for the generic relay and the aggregator, which wrap it with
/// their own descriptor, base URL, headers and fallback table.
pub struct OpenAiProvider {
    client: reqwest::Client,
    descriptor: ProviderDescriptor,
    config: ProviderConfig,
    base_url: String,
    extra_headers: Vec<(&'static str, String)>,
    fallback: fn() -> Vec<ModelInfo>,
    cache: Arc<ModelCache>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("id", &self.descriptor.id)
            .field("config", &self.config)
            .field("base_url", &self.base_url)
            .field("extra_headers", &self.extra_headers.len())
            .finish_non_exhaustive()
    }
}

impl Clone for OpenAiProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            descriptor: self.descriptor.clone(),
            config: self.config.clone(),
            base_url: self.base_url.clone(),
            extra_headers: self.extra_headers.clone(),
            fallback: self.fallback,
            cache: Arc::clone(&self.cache),
        }
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_identity(descriptor(), config, OPENAI_BASE_URL, fallback_models)
    }

    #[must_use]
    pub(crate) fn with_identity(
        descriptor: ProviderDescriptor,
        config: ProviderConfig,
        default_base_url: &str,
        fallback: fn() -> Vec<ModelInfo>,
    ) -> Self {
        let base_url = config.resolve_base_url(default_base_url);
        Self {
            client: crate::http::default_client(),
            descriptor,
            config,
            base_url,
            extra_headers: Vec::new(),
            fallback,
            cache: Arc::new(ModelCache::default()),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub(crate) fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.extra_headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn with_model_cache(mut self, cache: ModelCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("Content-Type", "application/json");
        if !self.config.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.config.api_key));
        }
        for (name, value) in &self.extra_headers {
            builder = builder.header(*name, value);
        }
        builder
    }

    async fn fetch_models(&self, timeout: std::time::Duration) -> Result<Vec<ModelInfo>, LlmError> {
        let provider = self.descriptor.id.as_str();
        let response = self
            .request(reqwest::Method::GET, "/models")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(provider, timeout, e))?;
        let list: ModelList = read_json(provider, response).await?;
        if list.data.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: provider.to_owned(),
            });
        }
        Ok(list.data.into_iter().map(ApiModel::into_model_info).collect())
    }

    /// Authenticated `GET {path}` under the validation timeout; any failure is `false`.
    pub(crate) async fn key_accepted_by(&self, path: &str) -> bool {
        let provider = self.descriptor.id.as_str();
        let timeout = self.config.effective_validate_timeout();
        let result = match self
            .request(reqwest::Method::GET, path)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => read_success_body(provider, response).await.map(drop),
            Err(e) => Err(transport_error(provider, timeout, e)),
        };
        if let Err(e) = &result {
            tracing::debug!(provider, "key validation failed: {e}");
        }
        result.is_ok()
    }

    async fn models_or_fallback(&self, force: bool) -> Vec<ModelInfo> {
        if force {
            self.cache.invalidate();
        }
        let timeout = self.config.chat_timeout;
        match self.cache.get_or_fetch(|| self.fetch_models(timeout)).await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(
                    provider = %self.descriptor.id,
                    "model discovery failed, using static list: {e}"
                );
                (self.fallback)()
            }
        }
    }
}

impl LlmProvider for OpenAiProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn available_models(&self) -> Vec<ModelInfo> {
        self.models_or_fallback(false).await
    }

    async fn refresh_models(&self) -> Vec<ModelInfo> {
        self.models_or_fallback(true).await
    }

    async fn validate_api_key(&self) -> bool {
        if self.config.api_key.is_empty() {
            return !self.descriptor.requires_api_key;
        }
        match self
            .fetch_models(self.config.effective_validate_timeout())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(provider = %self.descriptor.id, "key validation failed: {e}");
                false
            }
        }
    }

    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        validate_messages(messages)?;
        let provider = self.descriptor.id.as_str();
        let body = ChatRequest {
            model,
            messages: convert_messages(self, messages),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        tracing::debug!(
            provider,
            model,
            messages = body.messages.len(),
            "sending chat completion"
        );

        let timeout = self.config.chat_timeout;
        let response = self
            .request(reqwest::Method::POST, "/chat/completions")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(provider, timeout, e))?;

        let resp: ChatCompletion = read_json(provider, response).await?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: provider.to_owned(),
            })?;

        Ok(ChatResponse {
            content,
            usage: resp.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }

    fn format_image(&self, image: &ImageData) -> serde_json::Value {
        serde_json::json!({
            "type": "image_url",
            "image_url": { "url": image.data_url() }
        })
    }

    fn supports_vision(&self, model: &str) -> bool {
        model_supports_vision(model)
    }
}

/// Name-based vision heuristic for models without modality metadata.
#[must_use]
pub fn model_supports_vision(model: &str) -> bool {
    const VISION_HINTS: &[&str] = &[
        "gpt-4o", "gpt-4.1", "gpt-5", "o3", "o4", "vision", "-vl", "vl-", "llava", "pixtral",
        "claude-3", "claude-", "gemini", "gemma-3", "gemma3", "qwen2.5-vl", "llama-4",
    ];
    let lower = model.to_lowercase();
    VISION_HINTS.iter().any(|h| lower.contains(h))
}

fn convert_messages(provider: &OpenAiProvider, messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|msg| {
            let content = if msg.has_images() {
                let parts = msg
                    .parts()
                    .iter()
                    .map(|part| match part {
                        MessagePart::Text { text } => {
                            serde_json::json!({ "type": "text", "text": text })
                        }
                        MessagePart::Image(img) => provider.format_image(img),
                    })
                    .collect();
                serde_json::Value::Array(parts)
            } else {
                serde_json::Value::String(msg.text())
            };
            ApiMessage {
                role: msg.role.as_str(),
                content,
            }
        })
        .collect()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ApiModel>,
}

/// Model entry; the aggregator adds `name`, `context_length` and `architecture`.
#[derive(Deserialize)]
struct ApiModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    architecture: Option<Architecture>,
}

#[derive(Deserialize)]
struct Architecture {
    #[serde(default)]
    input_modalities: Vec<String>,
    #[serde(default)]
    modality: Option<String>,
}

impl ApiModel {
    fn into_model_info(self) -> ModelInfo {
        let supports_vision = match &self.architecture {
            Some(arch) if !arch.input_modalities.is_empty() => {
                arch.input_modalities.iter().any(|m| m == "image")
            }
            Some(Architecture {
                modality: Some(modality),
                ..
            }) => modality.split("->").next().is_some_and(|i| i.contains("image")),
            _ => model_supports_vision(&self.id),
        };
        ModelInfo {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            supports_vision,
            context_length: self.context_length,
            description: self.description,
        }
    }
}
