//! Shared HTTP client construction and response handling for the REST adapters.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::LlmError;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Create a shared HTTP client with standard snapsolve configuration.
///
/// Config: 10s connect timeout, rustls TLS, `snapsolve/{version}` user-agent,
/// redirect limit 10. Request timeouts are set per call from the provider config.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("snapsolve/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .unwrap_or_default()
}

/// Absolute `http`/`https` URL with a host. Rejects typos such as `localhost:11434`,
/// which parses as a URL with scheme `localhost`.
#[must_use]
pub fn is_http_url(url: &str) -> bool {
    reqwest::Url::parse(url.trim())
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
}

/// Map a transport error, turning reqwest timeouts into [`LlmError::Timeout`].
pub(crate) fn transport_error(provider: &str, timeout: Duration, e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout {
            provider: provider.to_owned(),
            secs: timeout.as_secs(),
        }
    } else {
        LlmError::Http(e)
    }
}

/// Read the body, failing with [`LlmError::Api`] on any non-success status.
pub(crate) async fn read_success_body(
    provider: &str,
    response: reqwest::Response,
) -> Result<String, LlmError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        tracing::error!("{provider} API error {status}: {}", truncate(&text));
        return Err(LlmError::Api {
            provider: provider.to_owned(),
            status: status.as_u16(),
            message: truncate(&text),
        });
    }
    Ok(text)
}

/// Read and deserialize a JSON body after checking the status.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, LlmError> {
    let text = read_success_body(provider, response).await?;
    Ok(serde_json::from_str(&text)?)
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_BODY_CHARS {
        text.to_owned()
    } else {
        let head: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{head}...")
    }
}
