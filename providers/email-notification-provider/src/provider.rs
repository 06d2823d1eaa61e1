use crate::{
    client::GmailClient, config::EmailConfig, formatter::EmailFormatter, oauth::OAuthTokenSource,
};
use async_trait::async_trait;
use notification_common::{
    provider_base::{ChannelSender, ProviderError},
    ChannelOutcome, NotificationChannel, NotificationContent, Recipient,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct EmailChannel {
    client: GmailClient,
    formatter: EmailFormatter,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Result<Self, ProviderError> {
        config.validate().map_err(|e| {
            ProviderError::InvalidConfiguration(format!("Config validation failed: {}", e))
        })?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ProviderError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;

        let tokens = Arc::new(OAuthTokenSource::new(
            http.clone(),
            config.token_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
            config.refresh_token.clone(),
        )?);

        info!(
            "📧 Email channel ready (sender: {}, max photos: {})",
            config.sender_email, config.max_photos
        );

        Ok(Self {
            client: GmailClient::new(http, config.api_base_url.clone(), tokens),
            formatter: EmailFormatter::new(&config),
        })
    }

    /// Create the channel from `EMAIL__*` environment variables
    pub fn from_env() -> Result<Self, ProviderError> {
        let config = EmailConfig::from_env().map_err(|e| {
            ProviderError::InvalidConfiguration(format!("Failed to load config: {}", e))
        })?;
        Self::new(config)
    }

    async fn try_send(
        &self,
        recipient: &Recipient,
        content: &NotificationContent,
    ) -> Result<String, ProviderError> {
        let payload = self.formatter.format_message(recipient, content)?;
        let response = self.client.send(&payload).await?;
        Ok(response.id)
    }
}

#[async_trait]
impl ChannelSender for EmailChannel {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    fn precondition_failure(&self, recipient: &Recipient) -> Option<String> {
        match recipient.email {
            Some(_) => None,
            None => Some("no valid email address".to_string()),
        }
    }

    async fn send(&self, recipient: &Recipient, content: &NotificationContent) -> ChannelOutcome {
        match self.try_send(recipient, content).await {
            Ok(message_id) => {
                info!(
                    event_id = %content.trace.event_id,
                    guest_id = %content.trace.guest_id,
                    "✅ Email sent: {}", message_id
                );
                ChannelOutcome::delivered(NotificationChannel::Email, Some(message_id))
            }
            Err(e) => {
                warn!(
                    event_id = %content.trace.event_id,
                    guest_id = %content.trace.guest_id,
                    retryable = e.is_retryable(),
                    "Email send failed: {}", e
                );
                e.into_outcome(NotificationChannel::Email)
            }
        }
    }
}
