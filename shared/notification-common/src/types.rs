//! Core types for the match notification system
//!
//! This module defines the channel, status and outcome types shared by the
//! state store, the channel providers and the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification channels supported by the dispatcher
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Chat,
}

impl NotificationChannel {
    /// All channels in commit order
    pub const ALL: [NotificationChannel; 2] = [NotificationChannel::Email, NotificationChannel::Chat];

    /// Get channel name as lowercase string (also the delivery record field prefix)
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Chat => "chat",
        }
    }
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationChannel::Email => write!(f, "Email"),
            NotificationChannel::Chat => write!(f, "Chat"),
        }
    }
}

/// Persisted per-channel status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Unsent,
    Sent,
    Failed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Unsent => "unsent",
            ChannelStatus::Sent => "sent",
            ChannelStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unsent" => Some(ChannelStatus::Unsent),
            "sent" => Some(ChannelStatus::Sent),
            "failed" => Some(ChannelStatus::Failed),
            _ => None,
        }
    }
}

/// Persisted aggregate status of a delivery record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Unset,
    Sent,
    Partial,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unset => "unset",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Partial => "partial",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unset" => Some(NotificationStatus::Unset),
            "sent" => Some(NotificationStatus::Sent),
            "partial" => Some(NotificationStatus::Partial),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }

    /// Aggregate of a record with `delivered` channels sent and `failed` channels outstanding
    pub fn from_counts(delivered: usize, failed: usize) -> Self {
        match (delivered, failed) {
            (0, _) => NotificationStatus::Failed,
            (_, 0) => NotificationStatus::Sent,
            _ => NotificationStatus::Partial,
        }
    }
}

/// Terminal state of one job processing attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Sent,
    Partial,
    Skipped,
    Failed,
}

impl JobStatus {
    /// Whether the queue should redeliver the record
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobStatus::Sent => "sent",
            JobStatus::Partial => "partial",
            JobStatus::Skipped => "skipped",
            JobStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Idempotency key of a delivery record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryKey {
    pub event_id: String,
    pub guest_id: String,
}

impl DeliveryKey {
    pub fn new(event_id: impl Into<String>, guest_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            guest_id: guest_id.into(),
        }
    }

    /// Storage key under the given namespace prefix
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{}:{}:{}", prefix, self.event_id, self.guest_id)
    }
}

impl std::fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.event_id, self.guest_id)
    }
}

/// Read projection of a delivery record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryState {
    pub email_sent: bool,
    pub chat_sent: bool,
}

impl DeliveryState {
    pub fn is_sent(&self, channel: NotificationChannel) -> bool {
        match channel {
            NotificationChannel::Email => self.email_sent,
            NotificationChannel::Chat => self.chat_sent,
        }
    }
}

/// Per-channel fields of a persisted delivery record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub status: ChannelStatus,
    pub sent: bool,
    pub message_id: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub deferred: bool,
}

/// Persisted delivery record keyed by `(event_id, guest_id)`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub email: ChannelRecord,
    pub chat: ChannelRecord,
    pub notification_status: NotificationStatus,
    pub notification_error: Option<String>,
    pub notification_updated_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    pub fn channel(&self, channel: NotificationChannel) -> &ChannelRecord {
        match channel {
            NotificationChannel::Email => &self.email,
            NotificationChannel::Chat => &self.chat,
        }
    }

    pub fn channel_mut(&mut self, channel: NotificationChannel) -> &mut ChannelRecord {
        match channel {
            NotificationChannel::Email => &mut self.email,
            NotificationChannel::Chat => &mut self.chat,
        }
    }

    pub fn state(&self) -> DeliveryState {
        DeliveryState {
            email_sent: self.email.sent,
            chat_sent: self.chat.sent,
        }
    }
}

/// Result of a single channel send attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub channel: NotificationChannel,
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error_detail: Option<String>,
    pub retryable_hint: Option<bool>,
    /// Accepted by the provider for later delivery (rate limited)
    #[serde(default)]
    pub deferred: bool,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    /// Attachment telemetry, never persisted
    #[serde(default)]
    pub media_attempted: u32,
    #[serde(default)]
    pub media_delivered: u32,
}

impl ChannelOutcome {
    pub fn delivered(channel: NotificationChannel, provider_message_id: Option<String>) -> Self {
        Self {
            channel,
            success: true,
            provider_message_id,
            error_detail: None,
            retryable_hint: None,
            deferred: false,
            delivered_at: Some(Utc::now()),
            media_attempted: 0,
            media_delivered: 0,
        }
    }

    pub fn deferred(channel: NotificationChannel, detail: impl Into<String>) -> Self {
        Self {
            channel,
            success: true,
            provider_message_id: None,
            error_detail: Some(detail.into()),
            retryable_hint: Some(false),
            deferred: true,
            delivered_at: Some(Utc::now()),
            media_attempted: 0,
            media_delivered: 0,
        }
    }

    pub fn failed(channel: NotificationChannel, detail: impl Into<String>, retryable: bool) -> Self {
        Self {
            channel,
            success: false,
            provider_message_id: None,
            error_detail: Some(detail.into()),
            retryable_hint: Some(retryable),
            deferred: false,
            delivered_at: None,
            media_attempted: 0,
            media_delivered: 0,
        }
    }

    pub fn with_media(mut self, attempted: u32, delivered: u32) -> Self {
        self.media_attempted = attempted;
        self.media_delivered = delivered;
        self
    }
}
