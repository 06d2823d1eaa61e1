use crate::formatter::EmailPayload;
use crate::oauth::OAuthTokenSource;
use notification_common::provider_base::ProviderError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Fallback wait when a 429 carries no usable Retry-After
const DEFAULT_RETRY_AFTER_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailSendResponse {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct GmailSendRequest {
    raw: String,
}

#[derive(Debug, Deserialize)]
struct GmailErrorBody {
    error: GmailError,
}

#[derive(Debug, Deserialize)]
struct GmailError {
    #[serde(default)]
    message: String,
}

/// Mail send API client authenticated with short-lived OAuth tokens
pub struct GmailClient {
    client: Client,
    api_base_url: String,
    tokens: Arc<OAuthTokenSource>,
}

impl GmailClient {
    pub fn new(client: Client, api_base_url: String, tokens: Arc<OAuthTokenSource>) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub async fn send(&self, payload: &EmailPayload) -> Result<GmailSendResponse, ProviderError> {
        let raw = payload.to_raw()?;
        let access_token = self.tokens.access_token().await?;
        let url = format!("{}/gmail/v1/users/me/messages/send", self.api_base_url);

        let response = self
            .client
            .post(url)
            .bearer_auth(&access_token)
            .json(&GmailSendRequest { raw })
            .send()
            .await
            .map_err(|e| {
                error!("Mail API request failed: {}", e);
                if e.is_timeout() {
                    ProviderError::NetworkTimeout
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let sent: GmailSendResponse = response.json().await.map_err(|e| {
                error!("Unreadable mail API response: {}", e);
                ProviderError::ExternalServiceError(format!("Invalid send response: {}", e))
            })?;
            debug!(message_id = %sent.id, thread_id = ?sent.thread_id, "Mail API accepted message");
            return Ok(sent);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!("Mail API rejected the access token, dropping cached token");
            self.tokens.invalidate().await;
            return Err(ProviderError::InvalidAuthentication);
        }

        let retry_after = retry_after_secs(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(send_error(status, retry_after, &body))
    }
}

fn retry_after_secs(headers: &HeaderMap) -> i64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Map a non-success send status onto the provider error taxonomy
fn send_error(status: StatusCode, retry_after: i64, body: &str) -> ProviderError {
    let api_message = serde_json::from_str::<GmailErrorBody>(body)
        .ok()
        .map(|parsed| parsed.error.message)
        .filter(|message| !message.is_empty());

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            warn!("Mail API rate limited, retry after {}s", retry_after);
            ProviderError::RateLimitExceeded {
                retry_after: chrono::Duration::seconds(retry_after),
            }
        }
        StatusCode::BAD_REQUEST => {
            let message = api_message.unwrap_or_else(|| "Mail API rejected the message".to_string());
            error!("Mail API rejected message: {}", message);
            ProviderError::MalformedPayload(message)
        }
        StatusCode::FORBIDDEN => {
            let message = api_message.unwrap_or_else(|| "Sender is not allowed to send mail".to_string());
            error!("Mail API refused sender: {}", message);
            ProviderError::PermanentFailure { message }
        }
        s if s.is_server_error() => {
            error!("Mail API unavailable ({})", s);
            ProviderError::ServiceUnavailable
        }
        s => {
            error!("Unexpected mail API status {}: {}", s, body);
            ProviderError::ExternalServiceError(format!("Unexpected mail API status {}", s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_defaults_when_missing_or_invalid() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_secs(&headers), DEFAULT_RETRY_AFTER_SECS);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after_secs(&headers), DEFAULT_RETRY_AFTER_SECS);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(retry_after_secs(&headers), 30);
    }

    #[test]
    fn test_forbidden_is_not_retryable() {
        let err = send_error(StatusCode::FORBIDDEN, 0, "");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_bad_request_uses_api_message() {
        let body = r#"{"error":{"code":400,"message":"Invalid To header"}}"#;
        match send_error(StatusCode::BAD_REQUEST, 0, body) {
            ProviderError::MalformedPayload(message) => assert_eq!(message, "Invalid To header"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
