//! Scriptable in-memory provider for pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::LlmError;
use crate::provider::{
    ChatOptions, ChatResponse, ImageData, LlmProvider, Message, ModelInfo, ProviderConfig,
    ProviderDescriptor, SetupInstructions,
};

/// One scripted outcome of a `chat` call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// Non-success HTTP status surfaced as [`LlmError::Api`].
    Status(u16),
    /// Wait before producing the inner reply, on top of the provider-wide delay.
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    #[must_use]
    pub fn delayed(delay: Duration, reply: MockReply) -> Self {
        Self::Delayed(delay, Box::new(reply))
    }
}

/// A `chat` call as the mock saw it.
#[derive(Debug, Clone)]
pub struct RecordedChat {
    pub messages: Vec<Message>,
    pub model: String,
    pub options: ChatOptions,
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    descriptor: ProviderDescriptor,
    config: ProviderConfig,
    replies: Arc<Mutex<Vec<MockReply>>>,
    routes: Arc<Vec<(String, MockReply)>>,
    calls: Arc<Mutex<Vec<RecordedChat>>>,
    validations: Arc<AtomicUsize>,
    pub default_response: String,
    pub models: Vec<ModelInfo>,
    pub key_valid: bool,
    pub delay: Duration,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            descriptor: descriptor(false),
            config: ProviderConfig::default(),
            replies: Arc::new(Mutex::new(Vec::new())),
            routes: Arc::new(Vec::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            validations: Arc::new(AtomicUsize::new(0)),
            default_response: "mock response".into(),
            models: vec![ModelInfo::new("mock-model", "Mock Model", true)],
            key_valid: true,
            delay: Duration::ZERO,
        }
    }
}

fn descriptor(requires_api_key: bool) -> ProviderDescriptor {
    ProviderDescriptor {
        id: "mock".into(),
        display_name: "Mock".into(),
        is_free: true,
        color_hint: "#999999".into(),
        requires_api_key,
        setup: SetupInstructions {
            signup_url: "https://example.invalid".into(),
            keys_url: None,
            description: "In-memory test provider".into(),
        },
    }
}

impl MockProvider {
    /// Replies consumed in order; once drained, `default_response` is returned.
    #[must_use]
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self::with_replies(responses.into_iter().map(MockReply::Text).collect())
    }

    /// Reply with `reply` whenever the last message contains `needle`.
    ///
    /// Routes are checked before the ordered replies, so concurrent callers get
    /// deterministic answers.
    #[must_use]
    pub fn route(mut self, needle: impl Into<String>, reply: MockReply) -> Self {
        let mut routes = (*self.routes).clone();
        routes.push((needle.into(), reply));
        self.routes = Arc::new(routes);
        self
    }

    /// Behave like a keyed backend configured with `api_key`.
    #[must_use]
    pub fn keyed(mut self, api_key: impl Into<String>) -> Self {
        self.descriptor = descriptor(true);
        self.config.api_key = api_key.into();
        self
    }

    #[must_use]
    pub fn with_key_valid(mut self, valid: bool) -> Self {
        self.key_valid = valid;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Every `chat` call so far, shared across clones.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedChat> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn validation_count(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    fn next_reply(&self, messages: &[Message]) -> MockReply {
        let last = messages.last().map(Message::text).unwrap_or_default();
        if let Some((_, reply)) = self.routes.iter().find(|(needle, _)| last.contains(needle)) {
            return reply.clone();
        }
        match self.replies.lock() {
            Ok(mut replies) if !replies.is_empty() => replies.remove(0),
            _ => MockReply::Text(self.default_response.clone()),
        }
    }
}

impl LlmProvider for MockProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn available_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    async fn refresh_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    async fn validate_api_key(&self) -> bool {
        self.validations.fetch_add(1, Ordering::SeqCst);
        if self.descriptor.requires_api_key && self.config.api_key.is_empty() {
            return false;
        }
        self.key_valid
    }

    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        crate::provider::validate_messages(messages)?;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedChat {
                messages: messages.to_vec(),
                model: model.to_owned(),
                options,
            });
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut reply = self.next_reply(messages);
        loop {
            match reply {
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                MockReply::Text(content) => {
                    return Ok(ChatResponse {
                        content,
                        usage: None,
                    });
                }
                MockReply::Status(status) => {
                    return Err(LlmError::Api {
                        provider: "mock".into(),
                        status,
                        message: format!("mock status {status}"),
                    });
                }
            }
        }
    }

    fn format_image(&self, image: &ImageData) -> serde_json::Value {
        serde_json::Value::String(image.data_url())
    }
}
