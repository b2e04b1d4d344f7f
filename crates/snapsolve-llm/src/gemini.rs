use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::ModelCache;
use crate::error::LlmError;
use crate::http::{read_json, transport_error};
use crate::provider::{
    ChatOptions, ChatResponse, ImageData, LlmProvider, Message, MessagePart, ModelInfo,
    ProviderConfig, ProviderDescriptor, Role, SetupInstructions, Usage, fold_system_into_user,
    validate_messages,
};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[must_use]
pub fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor {
        id: "gemini".into(),
        display_name: "Google Gemini".into(),
        is_free: true,
        color_hint: "#4285f4".into(),
        requires_api_key: true,
        setup: SetupInstructions {
            signup_url: "https://aistudio.google.com".into(),
            keys_url: Some("https://aistudio.google.com/app/apikey".into()),
            description: "Gemini models through Google AI Studio. The free tier is rate limited."
                .into(),
        },
    }
}

fn fallback_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new("gemini-2.5-flash", "Gemini 2.5 Flash", true)
            .with_context_length(1_048_576),
        ModelInfo::new("gemini-2.5-pro", "Gemini 2.5 Pro", true).with_context_length(1_048_576),
        ModelInfo::new("gemini-2.0-flash", "Gemini 2.0 Flash", true)
            .with_context_length(1_048_576),
    ]
}

pub struct GeminiProvider {
    client: reqwest::Client,
    descriptor: ProviderDescriptor,
    config: ProviderConfig,
    base_url: String,
    cache: Arc<ModelCache>,
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("client", &"<reqwest::Client>")
            .field("config", &self.config)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Clone for GeminiProvider {
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

impl GeminiProvider {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        let base_url = config.resolve_base_url(GEMINI_BASE_URL);
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
            .header("x-goog-api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
    }

    async fn fetch_models(&self, timeout: Duration) -> Result<Vec<ModelInfo>, LlmError> {
        let response = self
            .request(reqwest::Method::GET, "/models")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error("gemini", timeout, e))?;
        let list: ModelList = read_json("gemini", response).await?;
        let models: Vec<ModelInfo> = list
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|g| g == "generateContent")
            })
            .map(ApiModel::into_model_info)
            .collect();
        if models.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: "gemini".into(),
            });
        }
        Ok(models)
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
                tracing::warn!("gemini model discovery failed, using static list: {e}");
                fallback_models()
            }
        }
    }
}

impl LlmProvider for GeminiProvider {
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
            .inspect_err(|e| tracing::debug!("gemini key validation failed: {e}"))
            .is_ok()
    }

    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        validate_messages(messages)?;
        let body = RequestBody {
            contents: to_gemini_contents(self, messages),
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            },
        };
        tracing::debug!(
            model,
            contents = body.contents.len(),
            "sending gemini generateContent"
        );

        let model = model.strip_prefix("models/").unwrap_or(model);
        let timeout = self.config.chat_timeout;
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/models/{model}:generateContent"),
            )
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("gemini", timeout, e))?;

        let resp: ApiResponse = read_json("gemini", response).await?;
        let content = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: "gemini".into(),
            })?;

        Ok(ChatResponse {
            content,
            usage: resp.usage_metadata.map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            }),
        })
    }

    fn format_image(&self, image: &ImageData) -> serde_json::Value {
        serde_json::json!({
            "inline_data": {
                "mime_type": image.mime_type,
                "data": image.data,
            }
        })
    }
}

/// No native system slot here: system text is folded into the first user turn,
/// and assistant turns use the `model` role.
fn to_gemini_contents(provider: &GeminiProvider, messages: &[Message]) -> Vec<GeminiContent> {
    fold_system_into_user(messages)
        .iter()
        .map(|msg| GeminiContent {
            role: if msg.role == Role::Assistant {
                "model"
            } else {
                "user"
            },
            parts: msg
                .parts()
                .iter()
                .map(|part| match part {
                    MessagePart::Text { text } => serde_json::json!({ "text": text }),
                    MessagePart::Image(img) => provider.format_image(img),
                })
                .collect(),
        })
        .collect()
}

#[derive(Serialize)]
struct RequestBody {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ApiModel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiModel {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_token_limit: Option<u64>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl ApiModel {
    fn into_model_info(self) -> ModelInfo {
        let id = self
            .name
            .strip_prefix("models/")
            .unwrap_or(&self.name)
            .to_owned();
        ModelInfo {
            name: self.display_name.unwrap_or_else(|| id.clone()),
            supports_vision: id.starts_with("gemini") || id.starts_with("gemma-3"),
            id,
            context_length: self.input_token_limit,
            description: self.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_mock_server;

    fn provider_at(base_url: &str) -> GeminiProvider {
        GeminiProvider::new(ProviderConfig::with_api_key("AIza-test").base_url(base_url))
    }

    #[test]
    fn debug_hides_key() {
        let debug = format!("{:?}", provider_at("http://x"));
        assert!(!debug.contains("AIza-test"));
    }

    #[test]
    fn contents_fold_system_and_rename_assistant() {
        let p = provider_at("http://x");
        let contents = to_gemini_contents(
            &p,
            &[
                Message::system("strict"),
                Message::user_with_images("extract", vec![ImageData::png("AA")]),
                Message::assistant("done"),
            ],
        );
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[0].parts[0]["text"], "strict\n\nextract");
        assert_eq!(contents[0].parts[1]["inline_data"]["data"], "AA");
        assert_eq!(contents[1].role, "model");
    }

    #[test]
    fn generation_config_names() {
        let json = serde_json::to_value(GenerationConfig {
            temperature: Some(0.5),
            max_output_tokens: Some(4000),
        })
        .unwrap();
        assert_eq!(json["maxOutputTokens"], 4000);
        assert!(json.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn chat_request_shape() {
        let server = spawn_mock_server(vec![(
            200,
            r#"{"candidates":[{"content":{"parts":[{"text":"he"},{"text":"llo"}],"role":"model"}}],
                "usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":3}}"#,
        )])
        .await;
        let p = provider_at(&server.base_url);
        let resp = p
            .chat(
                &[Message::system("s"), Message::user("u")],
                "gemini-2.5-flash",
                ChatOptions::new(0.2, 4000),
            )
            .await
            .unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.usage.unwrap().prompt_tokens, 7);

        let req = &server.requests()[0];
        assert_eq!(req.path, "/models/gemini-2.5-flash:generateContent");
        assert_eq!(req.header("x-goog-api-key"), Some("AIza-test"));
        let body = req.json();
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4000);
        assert!(body.get("systemInstruction").is_none());
    }

    #[tokio::test]
    async fn chat_no_candidates_is_empty_response() {
        let server = spawn_mock_server(vec![(200, r#"{"candidates":[]}"#)]).await;
        let err = provider_at(&server.base_url)
            .chat(&[Message::user("u")], "gemini-2.5-flash", ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn chat_maps_429() {
        let server = spawn_mock_server(vec![(429, r#"{"error":{"code":429}}"#)]).await;
        let err = provider_at(&server.base_url)
            .chat(&[Message::user("u")], "gemini-2.5-flash", ChatOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn listing_filters_generate_content() {
        let server = spawn_mock_server(vec![(
            200,
            r#"{"models":[
                {"name":"models/gemini-2.5-flash","displayName":"Gemini 2.5 Flash",
                 "inputTokenLimit":1048576,"supportedGenerationMethods":["generateContent"]},
                {"name":"models/text-embedding-004","displayName":"Embedding",
                 "supportedGenerationMethods":["embedContent"]}
            ]}"#,
        )])
        .await;
        let models = provider_at(&server.base_url).available_models().await;
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "gemini-2.5-flash");
        assert_eq!(models[0].context_length, Some(1_048_576));
        assert!(models[0].supports_vision);
    }

    #[tokio::test]
    async fn validate_requires_key() {
        let p = GeminiProvider::new(ProviderConfig::default().base_url("http://127.0.0.1:1"));
        assert!(!p.validate_api_key().await);
    }
}
