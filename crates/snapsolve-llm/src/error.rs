#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{provider} API request failed (status {status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("request to {provider} timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// HTTP status code carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
