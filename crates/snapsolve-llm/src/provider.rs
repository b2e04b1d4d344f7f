use std::fmt;
use std::future::Future;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One image, already base64-encoded by the image source.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub data: String,
    pub mime_type: String,
}

impl ImageData {
    #[must_use]
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    #[must_use]
    pub fn png(data: impl Into<String>) -> Self {
        Self::new(data, "image/png")
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(STANDARD.encode(bytes), mime_type)
    }

    /// `data:` URL form used by the OpenAI-style `image_url` part.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("mime_type", &self.mime_type)
            .field("data_len", &self.data.len())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    Image(ImageData),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<MessagePart>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User turn with the instruction text first, followed by the images in order.
    #[must_use]
    pub fn user_with_images(text: impl Into<String>, images: Vec<ImageData>) -> Self {
        let mut parts = Vec::with_capacity(images.len() + 1);
        parts.push(MessagePart::Text { text: text.into() });
        parts.extend(images.into_iter().map(MessagePart::Image));
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }

    /// Concatenated text of all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    MessagePart::Text { text } => Some(text.as_str()),
                    MessagePart::Image(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageData> {
        let parts: &[MessagePart] = match &self.content {
            MessageContent::Text(_) => &[],
            MessageContent::Parts(parts) => parts,
        };
        parts.iter().filter_map(|p| match p {
            MessagePart::Image(img) => Some(img),
            MessagePart::Text { .. } => None,
        })
    }

    #[must_use]
    pub fn has_images(&self) -> bool {
        self.images().next().is_some()
    }

    /// Parts view; plain text becomes a single text part.
    #[must_use]
    pub fn parts(&self) -> Vec<MessagePart> {
        match &self.content {
            MessageContent::Text(text) => vec![MessagePart::Text { text: text.clone() }],
            MessageContent::Parts(parts) => parts.clone(),
        }
    }
}

/// Reject image parts outside user turns.
///
/// # Errors
///
/// Returns [`LlmError::InvalidMessage`] naming the offending message index.
pub fn validate_messages(messages: &[Message]) -> Result<(), LlmError> {
    for (idx, msg) in messages.iter().enumerate() {
        if msg.role != Role::User && msg.has_images() {
            return Err(LlmError::InvalidMessage(format!(
                "message {idx} ({}) carries image parts; only user messages may",
                msg.role.as_str()
            )));
        }
    }
    Ok(())
}

/// Fold every system message into the first user turn, preserving order.
///
/// Used by backends without a native system slot. System text is prepended to the
/// first user message that follows it; trailing system text with no user turn after
/// it becomes a user turn of its own.
#[must_use]
pub fn fold_system_into_user(messages: &[Message]) -> Vec<Message> {
    let mut pending: Vec<String> = Vec::new();
    let mut out = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => pending.push(msg.text()),
            Role::User if !pending.is_empty() => {
                let prefix = pending.drain(..).collect::<Vec<_>>().join("\n\n");
                let mut parts = msg.parts();
                match parts.first_mut() {
                    Some(MessagePart::Text { text }) => {
                        *text = format!("{prefix}\n\n{text}");
                    }
                    _ => parts.insert(0, MessagePart::Text { text: prefix }),
                }
                out.push(Message {
                    role: Role::User,
                    content: MessageContent::Parts(parts),
                });
            }
            _ => out.push(msg.clone()),
        }
    }

    if !pending.is_empty() {
        out.push(Message::user(pending.join("\n\n")));
    }
    out
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    #[must_use]
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<Usage>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupInstructions {
    pub signup_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys_url: Option<String>,
    pub description: String,
}

/// Identity of a backend. Defined once per adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    pub is_free: bool,
    pub color_hint: String,
    pub requires_api_key: bool,
    pub setup: SetupInstructions,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultModels {
    pub extraction: String,
    pub solution: String,
    pub debugging: String,
}

/// Per-session connection parameters, fixed for the lifetime of one adapter instance.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub default_models: DefaultModels,
    pub chat_timeout: Duration,
    pub validate_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            default_models: DefaultModels::default(),
            chat_timeout: DEFAULT_CHAT_TIMEOUT,
            validate_timeout: DEFAULT_VALIDATE_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout = timeout;
        self
    }

    /// Base URL override, or `default` with any trailing slash removed.
    #[must_use]
    pub fn resolve_base_url(&self, default: &str) -> String {
        let url = self
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(default);
        url.trim_end_matches('/').to_owned()
    }

    /// Validation timeout clamped to five seconds.
    #[must_use]
    pub fn effective_validate_timeout(&self) -> Duration {
        self.validate_timeout.min(DEFAULT_VALIDATE_TIMEOUT)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("default_models", &self.default_models)
            .field("chat_timeout", &self.chat_timeout)
            .field("validate_timeout", &self.validate_timeout)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub supports_vision: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ModelInfo {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, supports_vision: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            supports_vision,
            context_length: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_context_length(mut self, len: u64) -> Self {
        self.context_length = Some(len);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub trait LlmProvider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    #[must_use]
    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// Models offered by the backend. Never fails: live discovery errors degrade to
    /// the adapter's static list.
    fn available_models(&self) -> impl Future<Output = Vec<ModelInfo>> + Send;

    /// Drop the cached model list and fetch it again.
    fn refresh_models(&self) -> impl Future<Output = Vec<ModelInfo>> + Send;

    /// Cheapest authenticated round trip. Returns `false` on any error.
    fn validate_api_key(&self) -> impl Future<Output = bool> + Send;

    /// Send messages to the backend and return the assistant text.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Api`] carrying the HTTP status on non-success responses,
    /// or a transport/parse error.
    fn chat(
        &self,
        messages: &[Message],
        model: &str,
        options: ChatOptions,
    ) -> impl Future<Output = Result<ChatResponse, LlmError>> + Send;

    /// Backend-specific content part for one image.
    fn format_image(&self, image: &ImageData) -> serde_json::Value;

    fn supports_vision(&self, model: &str) -> bool {
        let _ = model;
        true
    }

    /// The config this instance was built from.
    fn config(&self) -> &ProviderConfig;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_with_images_keeps_order() {
        let msg = Message::user_with_images(
            "solve",
            vec![ImageData::png("AAA"), ImageData::png("BBB")],
        );
        let parts = msg.parts();
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], MessagePart::Text { text } if text == "solve"));
        assert!(matches!(&parts[2], MessagePart::Image(img) if img.data == "BBB"));
        assert_eq!(msg.images().count(), 2);
    }

    #[test]
    fn validate_rejects_images_outside_user_turns() {
        let bad = Message {
            role: Role::Assistant,
            content: MessageContent::Parts(vec![MessagePart::Image(ImageData::png("x"))]),
        };
        assert!(validate_messages(&[Message::user("hi"), bad]).is_err());
        assert!(
            validate_messages(&[
                Message::system("s"),
                Message::user_with_images("t", vec![ImageData::png("x")])
            ])
            .is_ok()
        );
    }

    #[test]
    fn fold_system_prepends_to_first_user_turn() {
        let folded = fold_system_into_user(&[
            Message::system("be strict"),
            Message::user_with_images("extract", vec![ImageData::png("x")]),
            Message::assistant("ok"),
        ]);
        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].role, Role::User);
        assert_eq!(folded[0].text(), "be strict\n\nextract");
        assert!(folded[0].has_images());
        assert_eq!(folded[1].role, Role::Assistant);
    }

    #[test]
    fn fold_system_without_user_turn_becomes_user() {
        let folded = fold_system_into_user(&[Message::system("only system")]);
        assert_eq!(folded, vec![Message::user("only system")]);
    }

    #[test]
    fn data_url_format() {
        let img = ImageData::new("Zm9v", "image/jpeg");
        assert_eq!(img.data_url(), "data:image/jpeg;base64,Zm9v");
    }

    #[test]
    fn from_bytes_encodes_base64() {
        let img = ImageData::from_bytes(b"foo", "image/png");
        assert_eq!(img.data, "Zm9v");
    }

    #[test]
    fn image_debug_hides_payload() {
        let debug = format!("{:?}", ImageData::png("SECRETPAYLOAD"));
        assert!(!debug.contains("SECRETPAYLOAD"));
        assert!(debug.contains("data_len"));
    }

    #[test]
    fn config_debug_redacts_key() {
        let cfg = ProviderConfig::with_api_key("sk-live-123");
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("sk-live-123"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn resolve_base_url_prefers_override() {
        let cfg = ProviderConfig::default().base_url("http://host:1234/v1/");
        assert_eq!(cfg.resolve_base_url("https://x"), "http://host:1234/v1");
        assert_eq!(
            ProviderConfig::default().resolve_base_url("https://api/"),
            "https://api"
        );
    }

    #[test]
    fn validate_timeout_is_clamped() {
        let mut cfg = ProviderConfig::default();
        cfg.validate_timeout = Duration::from_secs(30);
        assert_eq!(cfg.effective_validate_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    }
}
