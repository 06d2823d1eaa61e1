use serde::{Deserialize, Serialize};

/// Text message request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTextRequest {
    pub session: String,
    pub recipient: String,
    pub text: String,
}

/// Media message request, one attachment per call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMediaRequest {
    pub session: String,
    pub recipient: String,
    pub media_url: String,
    pub caption: String,
}

/// Chat API send response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatApiResponse {
    #[serde(default, alias = "messageId")]
    pub id: Option<String>,
}

/// Structured chat API error
#[derive(Debug, Clone, Deserialize)]
pub struct ChatApiError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatApiError {
    pub fn describe(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

/// Result of one accepted chat API call
#[derive(Debug, Clone, PartialEq)]
pub enum ChatSendResult {
    Sent { message_id: Option<String> },
    /// Rate limited; the provider queues the message and retries on its own
    Deferred { retry_after_secs: Option<u64> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_request_wire_format() {
        let request = ChatMediaRequest {
            session: "default".to_string(),
            recipient: "15550001111".to_string(),
            media_url: "https://photos.example.com/photos/IMG_1.jpg".to_string(),
            caption: "Photo 1".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["mediaUrl"], "https://photos.example.com/photos/IMG_1.jpg");
        assert!(value.get("media_url").is_none());
    }

    #[test]
    fn test_response_accepts_message_id_alias() {
        let response: ChatApiResponse = serde_json::from_value(json!({"messageId": "m-1"})).unwrap();
        assert_eq!(response.id.as_deref(), Some("m-1"));
    }
}
