use crate::chat_client::ChatClient;
use crate::config::ChatConfig;
use crate::types::ChatSendResult;
use async_trait::async_trait;
use notification_common::{
    provider_base::{ChannelSender, ProviderError},
    ChannelOutcome, NotificationChannel, NotificationContent, Recipient,
};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chat channel: one text message followed by media attachments
pub struct ChatChannel {
    client: ChatClient,
    config: ChatConfig,
}

impl ChatChannel {
    pub fn new(config: ChatConfig) -> Result<Self, ProviderError> {
        config.validate().map_err(|e| {
            ProviderError::InvalidConfiguration(format!("Config validation failed: {}", e))
        })?;

        let client = ChatClient::new(&config)?;
        info!(
            "💬 Chat channel ready (session: {}, max media: {})",
            config.session, config.max_media
        );

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let config = ChatConfig::from_env().map_err(|e| {
            ProviderError::InvalidConfiguration(format!("Failed to load config: {}", e))
        })?;
        Self::new(config)
    }

    fn pre_send_delay(&self) -> Duration {
        let millis = rand::thread_rng()
            .gen_range(self.config.min_pre_send_delay_ms..=self.config.max_pre_send_delay_ms);
        Duration::from_millis(millis)
    }

    async fn send_composite(&self, phone: &str, content: &NotificationContent) -> ChannelOutcome {
        let delay = self.pre_send_delay();
        debug!("Waiting {:?} before chat send", delay);
        tokio::time::sleep(delay).await;

        let message_id = match self.client.send_text(phone, &content.chat_text).await {
            Ok(ChatSendResult::Sent { message_id }) => message_id,
            Ok(ChatSendResult::Deferred { .. }) => {
                // the provider retries internally, so no media and no re-send
                return ChannelOutcome::deferred(
                    NotificationChannel::Chat,
                    "Rate limited, message queued by provider",
                );
            }
            Err(e) => return e.into_outcome(NotificationChannel::Chat),
        };

        let mut attempted = 0u32;
        let mut delivered = 0u32;
        for item in content.media.iter().take(self.config.max_media) {
            tokio::time::sleep(self.config.media_delay()).await;
            attempted += 1;

            match self.client.send_media(phone, &item.url, &item.caption).await {
                Ok(ChatSendResult::Sent { .. }) => delivered += 1,
                Ok(ChatSendResult::Deferred { .. }) => {
                    warn!("Chat media rate limited, skipping remaining attachments");
                    break;
                }
                Err(e) => warn!("Chat media {} failed: {}", item.url, e),
            }
        }

        ChannelOutcome::delivered(NotificationChannel::Chat, message_id)
            .with_media(attempted, delivered)
    }
}

#[async_trait]
impl ChannelSender for ChatChannel {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Chat
    }

    fn precondition_failure(&self, recipient: &Recipient) -> Option<String> {
        match recipient.phone {
            Some(_) => None,
            None => Some("no phone number".to_string()),
        }
    }

    async fn send(&self, recipient: &Recipient, content: &NotificationContent) -> ChannelOutcome {
        let phone = match recipient.phone.as_deref() {
            Some(phone) => phone,
            None => {
                return ProviderError::MalformedPayload("Recipient has no phone number".to_string())
                    .into_outcome(NotificationChannel::Chat)
            }
        };

        let timeout = self.config.send_timeout();
        let outcome = match tokio::time::timeout(timeout, self.send_composite(phone, content)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    event_id = %content.trace.event_id,
                    guest_id = %content.trace.guest_id,
                    "Chat send timed out after {:?}", timeout
                );
                ProviderError::SendTimeout {
                    millis: self.config.send_timeout_ms,
                }
                .into_outcome(NotificationChannel::Chat)
            }
        };

        if outcome.success {
            info!(
                event_id = %content.trace.event_id,
                guest_id = %content.trace.guest_id,
                deferred = outcome.deferred,
                media_attempted = outcome.media_attempted,
                media_delivered = outcome.media_delivered,
                "✅ Chat message sent"
            );
        } else {
            warn!(
                event_id = %content.trace.event_id,
                guest_id = %content.trace.guest_id,
                "Chat send failed: {}",
                outcome.error_detail.as_deref().unwrap_or("unknown error")
            );
        }

        outcome
    }
}
