use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use crate::payloads::{NotificationContent, NotificationJob, Recipient};
use crate::types::{ChannelOutcome, NotificationChannel};

/// Uniform contract every outbound channel implements
///
/// `send` never fails the caller: transport problems are reported inside the
/// returned [`ChannelOutcome`] so one channel cannot abort its sibling.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Get the channel this sender handles
    fn channel(&self) -> NotificationChannel;

    /// Why this recipient cannot be reached on this channel, if it cannot
    fn precondition_failure(&self, recipient: &Recipient) -> Option<String>;

    /// Deliver rendered content to the recipient
    async fn send(&self, recipient: &Recipient, content: &NotificationContent) -> ChannelOutcome;
}

/// Turns a job into the content of every channel
pub trait ContentRenderer: Send + Sync {
    fn render(&self, job: &NotificationJob) -> Result<NotificationContent, RenderError>;
}

#[derive(Debug, Error)]
#[error("Failed to render notification content: {0}")]
pub struct RenderError(pub String);

/// Provider error types
#[derive(Debug, Error)]
pub enum ProviderError {
    // Retryable errors
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Network timeout")]
    NetworkTimeout,

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Temporary failure: {message}")]
    TemporaryFailure { message: String },

    #[error("Send timed out after {millis}ms")]
    SendTimeout { millis: u64 },

    #[error("Network error: {0}")]
    NetworkError(String),

    // Non-retryable errors
    #[error("Invalid API key or authentication")]
    InvalidAuthentication,

    #[error("Failed to acquire access token: {0}")]
    TokenAcquisition(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Permanent failure: {message}")]
    PermanentFailure { message: String },

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}

impl ProviderError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimitExceeded { .. }
                | ProviderError::NetworkTimeout
                | ProviderError::ServiceUnavailable
                | ProviderError::TemporaryFailure { .. }
                | ProviderError::SendTimeout { .. }
                | ProviderError::NetworkError(_)
                | ProviderError::ExternalServiceError(_)
        )
    }

    /// Get retry delay if applicable
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimitExceeded { retry_after } => Some(*retry_after),
            ProviderError::NetworkTimeout | ProviderError::ServiceUnavailable => {
                Some(Duration::seconds(5))
            }
            ProviderError::TemporaryFailure { .. } => Some(Duration::seconds(10)),
            _ => None,
        }
    }

    /// Convert into a failed outcome for the given channel
    pub fn into_outcome(self, channel: NotificationChannel) -> ChannelOutcome {
        let retryable = self.is_retryable();
        ChannelOutcome::failed(channel, self.to_string(), retryable)
    }
}
