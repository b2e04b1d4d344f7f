use snapsolve_llm::LlmError;

/// Terminal failure of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("no screenshots to process")]
    NoScreenshots,

    #[error("invalid API credentials")]
    InvalidCredentials,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider server error")]
    ServerError,

    #[error("run cancelled")]
    Cancelled,

    #[error("{0}")]
    Unknown(String),
}

impl PipelineError {
    /// Reclassify an adapter error by the HTTP status it carries.
    #[must_use]
    pub fn from_llm(err: &LlmError) -> Self {
        if err.is_auth() {
            Self::InvalidCredentials
        } else if err.is_rate_limited() {
            Self::RateLimited
        } else if err.is_server_error() {
            Self::ServerError
        } else {
            Self::Unknown(err.to_string())
        }
    }

    /// Message suitable for showing to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NoScreenshots => "No screenshots to process. Capture at least one first.".into(),
            Self::InvalidCredentials => {
                "The API key was rejected. Check the key in your settings.".into()
            }
            Self::RateLimited => {
                "The provider is rate limiting requests. Wait a moment and try again.".into()
            }
            Self::ServerError => {
                "The provider had a server error. Try again later or switch providers.".into()
            }
            Self::Cancelled => "Processing was cancelled.".into(),
            Self::Unknown(message) => format!("Processing failed: {message}"),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        Self::from_llm(&err)
    }
}
