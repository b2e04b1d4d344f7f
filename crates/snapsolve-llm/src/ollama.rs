use std::fmt;
use std::sync::Arc;

use ollama_rs::Ollama;
use serde::{Deserialize, Serialize};

use crate::cache::ModelCache;
use crate::error::LlmError;
use crate::http::{read_json, transport_error};
use crate::provider::{
    ChatOptions, ChatResponse, ImageData, LlmProvider, Message, ModelInfo, ProviderConfig,
    ProviderDescriptor, SetupInstructions, Usage, validate_messages,
};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_PORT: u16 = 11434;

#[must_use]
pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: "ollama".into(),
        display_name: "Ollama (local)".into(),
        is_free: true,
        color_hint: "#000000".into(),
        requires_api_key: false,
        setup: SetupInstructions {
            signup_url: "https://ollama.com/download".into(),
            keys_url: None,
            description: "Runs models on this machine. Pull a vision model such as \
                          `llava` or `gemma3` for screenshot extraction."
                .into(),
        },
    }
}

fn fallback_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new("llava", "LLaVA", true),
        ModelInfo::new("gemma3", "Gemma 3", true),
        ModelInfo::new("llama3.2-vision", "Llama 3.2 Vision", true),
        ModelInfo::new("qwen2.5-coder", "Qwen2.5 Coder", false),
    ]
}

/// Local inference server. Listing goes through `ollama-rs`; chat posts to `/api/chat`
/// directly so sampling options and the request timeout stay under our control.
#[derive(Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    ollama: Ollama,
    descriptor: ProviderDescriptor,
    config: ProviderConfig,
    base_url: String,
    cache: Arc<ModelCache>,
}

impl fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OllamaProvider {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        let mut base_url = config.resolve_base_url(OLLAMA_BASE_URL);
        if !crate::http::is_http_url(&base_url) {
            tracing::warn!("invalid Ollama base_url {base_url:?}, using {OLLAMA_BASE_URL}");
            base_url = OLLAMA_BASE_URL.to_owned();
        }
        let (host, port) = parse_host_port(&base_url);
        Self {
            client: crate::http::default_client(),
            ollama: Ollama::new(host, port),
            descriptor: descriptor(),
            config,
            base_url,
            cache: Arc::new(ModelCache::default()),
        }
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let timeout = self.config.chat_timeout;
        let local = tokio::time::timeout(timeout, self.ollama.list_local_models())
            .await
            .map_err(|_| LlmError::Timeout {
                provider: "ollama".into(),
                secs: timeout.as_secs(),
            })?
            .map_err(|e| LlmError::Other(format!("failed to list Ollama models: {e}")))?;
        if local.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: "ollama".into(),
            });
        }
        Ok(local
            .into_iter()
            .map(|m| {
                let vision = model_supports_vision(&m.name);
                ModelInfo::new(m.name.clone(), m.name, vision)
            })
            .collect())
    }

    fn convert_message(&self, msg: &Message) -> ApiMessage {
        let images: Vec<serde_json::Value> =
            msg.images().map(|img| self.format_image(img)).collect();
        ApiMessage {
            role: msg.role.as_str(),
            content: msg.text(),
            images: if images.is_empty() { None } else { Some(images) },
        }
    }

    async fn models_or_fallback(&self, force: bool) -> Vec<ModelInfo> {
        if force {
            self.cache.invalidate();
        }
        match self.cache.get_or_fetch(|| self.fetch_models()).await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!("Ollama model discovery failed, is it running? {e}");
                fallback_models()
            }
        }
    }
}

impl LlmProvider for OllamaProvider {
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
        true
    }

    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        validate_messages(messages)?;
        let body = ChatRequest {
            model,
            messages: messages.iter().map(|m| self.convert_message(m)).collect(),
            stream: false,
            options: RequestOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };
        tracing::debug!(model, messages = body.messages.len(), "sending Ollama chat");

        let timeout = self.config.chat_timeout;
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("ollama", timeout, e))?;

        let resp: ChatResponseBody = read_json("ollama", response).await?;
        let content = resp
            .message
            .map(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: "ollama".into(),
            })?;

        let usage = match (resp.prompt_eval_count, resp.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(Usage {
                prompt_tokens: prompt.unwrap_or(0),
                completion_tokens: completion.unwrap_or(0),
            }),
        };
        Ok(ChatResponse { content, usage })
    }

    /// Raw base64, no data-URL prefix.
    fn format_image(&self, image: &ImageData) -> serde_json::Value {
        serde_json::Value::String(image.data.clone())
    }

    fn supports_vision(&self, model: &str) -> bool {
        model_supports_vision(model)
    }
}

fn model_supports_vision(model: &str) -> bool {
    const VISION_HINTS: &[&str] = &[
        "llava", "vision", "-vl", "gemma3", "minicpm-v", "moondream", "bakllava", "qwen2.5vl",
        "granite3.2-vision", "mistral-small3",
    ];
    let lower = model.to_lowercase();
    VISION_HINTS.iter().any(|h| lower.contains(h))
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':')
        && let Ok(port) = url[colon_pos + 1..].parse::<u16>()
    {
        return (url[..colon_pos].to_owned(), port);
    }
    (url.to_owned(), DEFAULT_PORT)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    stream: bool,
    options: RequestOptions,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<serde_json::Value>>,
}

#[derive(Serialize)]
struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}
