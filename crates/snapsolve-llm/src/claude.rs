use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::ModelCache;
use crate::error::LlmError;
use crate::http::{read_json, transport_error};
use crate::provider::{
    ChatOptions, ChatResponse, ImageData, LlmProvider, Message, MessagePart, ModelInfo,
    ProviderConfig, ProviderDescriptor, Role, SetupInstructions, Usage, validate_messages,
};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// `max_tokens` is mandatory on the messages endpoint.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[must_use]
pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: "anthropic".into(),
        display_name: "Anthropic Claude".into(),
        is_free: false,
        color_hint: "#d97757".into(),
        requires_api_key: true,
        setup: SetupInstructions {
            signup_url: "https://console.anthropic.com".into(),
            keys_url: Some("https://console.anthropic.com/settings/keys".into()),
            description: "Claude models via the Anthropic API. All current models accept images."
                .into(),
        },
    }
}

fn fallback_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new("claude-sonnet-4-20250514", "Claude Sonnet 4", true)
            .with_context_length(200_000),
        ModelInfo::new("claude-opus-4-20250514", "Claude Opus 4", true)
            .with_context_length(200_000),
        ModelInfo::new("claude-3-5-haiku-20241022", "Claude Haiku 3.5", true)
            .with_context_length(200_000),
    ]
}

pub struct ClaudeProvider {
    client: reqwest::Client,
    descriptor: ProviderDescriptor,
    config: ProviderConfig,
    base_url: String,
    cache: Arc<ModelCache>,
}

impl fmt::Debug for ClaudeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeProvider")
            .field("client", &"<reqwest::Client>")
            .field("config", &self.config)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Clone for ClaudeProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            descriptor: self.descriptor.clone(),
            config: self.config.clone(),
            base_url: self.base_url.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl ClaudeProvider {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        let base_url = config.resolve_base_url(ANTHROPIC_BASE_URL);
        Self {
            client: crate::http::default_client(),
            descriptor: descriptor(),
            config,
            base_url,
            cache: Arc::new(ModelCache::default()),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
    }

    async fn fetch_models(&self, timeout: Duration) -> Result<Vec<ModelInfo>, LlmError> {
        let response = self
            .request(reqwest::Method::GET, "/v1/models")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error("anthropic", timeout, e))?;
        let list: ModelList = read_json("anthropic", response).await?;
        if list.data.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: "anthropic".into(),
            });
        }
        Ok(list
            .data
            .into_iter()
            .map(|m| {
                let name = m.display_name.unwrap_or_else(|| m.id.clone());
                ModelInfo::new(m.id, name, true)
            })
            .collect())
    }

    async fn models_or_fallback(&self, force: bool) -> Vec<ModelInfo> {
        if self.config.api_key.is_empty() {
            return fallback_models();
        }
        if force {
            self.cache.invalidate();
        }
        let timeout = self.config.chat_timeout;
        match self.cache.get_or_fetch(|| self.fetch_models(timeout)).await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!("anthropic model discovery failed, using static list: {e}");
                fallback_models()
            }
        }
    }
}

impl LlmProvider for ClaudeProvider {
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
            return false;
        }
        self.fetch_models(self.config.effective_validate_timeout())
            .await
            .inspect_err(|e| tracing::debug!("anthropic key validation failed: {e}"))
            .is_ok()
    }

    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        validate_messages(messages)?;
        let (system, chat_messages) = split_messages(self, messages);
        let body = RequestBody {
            model,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: chat_messages,
            temperature: options.temperature,
        };
        tracing::debug!(
            model,
            messages = body.messages.len(),
            has_system = body.system.is_some(),
            "sending anthropic messages request"
        );

        let timeout = self.config.chat_timeout;
        let response = self
            .request(reqwest::Method::POST, "/v1/messages")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("anthropic", timeout, e))?;

        let resp: ApiResponse = read_json("anthropic", response).await?;
        let content = resp
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: "anthropic".into(),
            });
        }

        Ok(ChatResponse {
            content,
            usage: resp.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            }),
        })
    }

    fn format_image(&self, image: &ImageData) -> serde_json::Value {
        serde_json::json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": image.mime_type,
                "data": image.data,
            }
        })
    }
}

/// System text goes to the top-level `system` field; the rest become content-block turns.
fn split_messages(
    provider: &ClaudeProvider,
    messages: &[Message],
) -> (Option<String>, Vec<ApiMessage>) {
    let mut system_parts = Vec::new();
    let mut chat = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::System => {
                system_parts.push(msg.text());
                continue;
            }
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let content = msg
            .parts()
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } if text.is_empty() => None,
                MessagePart::Text { text } => {
                    Some(serde_json::json!({ "type": "text", "text": text }))
                }
                MessagePart::Image(img) => Some(provider.format_image(img)),
            })
            .collect();
        chat.push(ApiMessage { role, content });
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, chat)
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ApiModel>,
}

#[derive(Deserialize)]
struct ApiModel {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}
