use crate::config::ChatConfig;
use crate::types::{ChatApiError, ChatApiResponse, ChatMediaRequest, ChatSendResult, ChatTextRequest};
use notification_common::provider_base::ProviderError;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Chat API client
pub struct ChatClient {
    http_client: Client,
    base_url: String,
    api_token: String,
    session: String,
}

/// Phone number as the chat API addresses it: digits only
pub fn normalize_recipient(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                ProviderError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            session: config.session.clone(),
        })
    }

    /// Send a text message
    pub async fn send_text(&self, phone: &str, text: &str) -> Result<ChatSendResult, ProviderError> {
        let request = ChatTextRequest {
            session: self.session.clone(),
            recipient: normalize_recipient(phone),
            text: text.to_string(),
        };

        debug!("Sending chat text to {}", request.recipient);
        self.post("sendText", &request).await
    }

    /// Send one media attachment
    pub async fn send_media(
        &self,
        phone: &str,
        media_url: &str,
        caption: &str,
    ) -> Result<ChatSendResult, ProviderError> {
        let request = ChatMediaRequest {
            session: self.session.clone(),
            recipient: normalize_recipient(phone),
            media_url: media_url.to_string(),
            caption: caption.to_string(),
        };

        debug!("Sending chat media {} to {}", media_url, request.recipient);
        self.post("sendImage", &request).await
    }

    async fn post<T: Serialize>(
        &self,
        endpoint: &str,
        request: &T,
    ) -> Result<ChatSendResult, ProviderError> {
        let response = self
            .http_client
            .post(format!("{}/api/{}", self.base_url, endpoint))
            .bearer_auth(&self.api_token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send chat API request: {}", e);
                if e.is_timeout() {
                    ProviderError::NetworkTimeout
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();

        if status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message_id = serde_json::from_str::<ChatApiResponse>(&body)
                .ok()
                .and_then(|r| r.id);
            return Ok(ChatSendResult::Sent { message_id });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            warn!(
                "Chat API rate limited ({}), provider will deliver later (retry after {:?}s)",
                endpoint, retry_after_secs
            );
            return Ok(ChatSendResult::Deferred { retry_after_secs });
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ChatApiError>(&body)
            .map(|e| e.describe())
            .unwrap_or(body);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("Chat API authentication failed: {}", detail);
                Err(ProviderError::InvalidAuthentication)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                error!("Chat API rejected request: {}", detail);
                Err(ProviderError::MalformedPayload(detail))
            }
            s if s.is_server_error() => {
                error!("Chat API service error {}: {}", s, detail);
                Err(ProviderError::ServiceUnavailable)
            }
            _ => {
                error!("Unexpected chat API status {}: {}", status, detail);
                Err(ProviderError::ExternalServiceError(format!(
                    "Unexpected status code {}: {}",
                    status, detail
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_recipient() {
        assert_eq!(normalize_recipient("+1 (555) 000-1111"), "15550001111");
    }
}
