use crate::core::error::ProviderError;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Client shared by every request of one provider. Requests are bounded by `timeout`.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent("vtrade/1.0")
        .timeout(timeout)
        .build()
}

/// Sends `request` once and decodes a JSON body. Non-2xx answers are errors.
pub async fn fetch_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::new(provider, "request timed out")
        } else {
            ProviderError::new(provider, format!("request failed: {e}"))
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::new(provider, format!("failed to read response: {e}")))?;
    debug!(provider, %status, bytes = body.len(), "Received response");

    if !status.is_success() {
        return Err(ProviderError::new(
            provider,
            format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
        ));
    }
    if body.trim().is_empty() {
        return Err(ProviderError::new(provider, "empty response"));
    }

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::new(provider, format!("malformed response: {e}")))
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
