//! Notification payload structures
//!
//! This module defines the inbound queue payloads (batch records and the
//! photo-match job they carry), the validated job handed to the channels, the
//! rendered multi-channel content, and the batch response returned to the queue.

use crate::types::{ChannelOutcome, DeliveryKey, JobStatus, NotificationChannel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record of a queue batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub record_id: String,
    /// JSON-encoded [`QueueEnvelope`]
    pub body: String,
    /// Delivery attempt counter reported by the queue, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_count: Option<u32>,
}

/// A batch of records delivered by the queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueBatch {
    #[serde(default, alias = "Records")]
    pub records: Vec<QueueRecord>,
}

/// Decoded record body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEnvelope {
    pub payload: RawNotificationJob,
}

/// Job payload exactly as produced upstream; every field may be missing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNotificationJob {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub guest_id: Option<String>,
    #[serde(default)]
    pub recipient: Option<RawRecipient>,
    #[serde(default)]
    pub match_summary: Option<RawMatchSummary>,
    #[serde(default)]
    pub presentation_metadata: Option<RawPresentationMetadata>,
}

impl RawNotificationJob {
    /// Idempotency key, available as soon as both ids are present and non-blank
    pub fn delivery_key(&self) -> Option<DeliveryKey> {
        let event_id = self.event_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let guest_id = self.guest_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(DeliveryKey::new(event_id, guest_id))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecipient {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMatchSummary {
    /// Kept untyped so a non-numeric value is a validation failure, not a decode failure
    #[serde(default)]
    pub total_matches: Option<serde_json::Value>,
    #[serde(default)]
    pub best_score: Option<f64>,
    #[serde(default)]
    pub average_score: Option<f64>,
    #[serde(default)]
    pub top_matches: Vec<TopMatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPresentationMetadata {
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub business_logo_url: Option<String>,
    #[serde(default)]
    pub gallery_link_base: Option<String>,
}

/// Validated photo-match notification job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    pub event_id: String,
    pub guest_id: String,
    pub recipient: Recipient,
    pub match_summary: MatchSummary,
    pub presentation: PresentationMetadata,
}

impl NotificationJob {
    pub fn delivery_key(&self) -> DeliveryKey {
        DeliveryKey::new(self.event_id.clone(), self.guest_id.clone())
    }

    /// Personal gallery link for this guest
    pub fn gallery_link(&self) -> String {
        format!(
            "{}/events/{}/guests/{}",
            self.presentation.gallery_link_base.trim_end_matches('/'),
            self.event_id,
            self.guest_id
        )
    }
}

/// Contact details of the guest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    /// Only set when the address passed format validation
    pub email: Option<String>,
    pub phone: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub total_matches: u32,
    pub best_score: f64,
    pub average_score: f64,
    pub top_matches: Vec<TopMatch>,
}

/// A matched photo, ordered best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopMatch {
    pub asset_ref: String,
    #[serde(default)]
    pub score: f64,
    /// Direct media URL; derived from the gallery base when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TopMatch {
    pub fn media_url(&self, gallery_link_base: &str) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "{}/photos/{}",
                gallery_link_base.trim_end_matches('/'),
                self.asset_ref
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationMetadata {
    pub event_name: Option<String>,
    pub event_date: Option<String>,
    pub business_name: Option<String>,
    pub business_logo_url: Option<String>,
    pub gallery_link_base: String,
}

/// Rendered content for every channel of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub chat_text: String,
    /// Best-first media, channels apply their own attachment limit
    pub media: Vec<MediaItem>,
    pub trace: TraceContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub caption: String,
}

/// Identifiers carried as custom trace headers by outbound messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceContext {
    pub event_id: String,
    pub guest_id: String,
    pub match_count: u32,
}

/// Per-record result of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub record_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<ChannelOutcome>,
}

impl BatchItemResult {
    /// Channels newly delivered by this attempt
    pub fn sent_channels(&self) -> impl Iterator<Item = NotificationChannel> + '_ {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.success)
            .map(|outcome| outcome.channel)
    }
}

/// Aggregate counts for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetrics {
    pub processed: u64,
    pub sent: u64,
    pub partial: u64,
    pub skipped: u64,
    pub failed: u64,
    pub email_sent: u64,
    pub chat_sent: u64,
}

impl BatchMetrics {
    pub fn from_items(items: &[BatchItemResult]) -> Self {
        let mut metrics = BatchMetrics::default();
        for item in items {
            metrics.processed += 1;
            match item.status {
                JobStatus::Sent => metrics.sent += 1,
                JobStatus::Partial => metrics.partial += 1,
                JobStatus::Skipped => metrics.skipped += 1,
                JobStatus::Failed => metrics.failed += 1,
            }
            for channel in item.sent_channels() {
                match channel {
                    NotificationChannel::Email => metrics.email_sent += 1,
                    NotificationChannel::Chat => metrics.chat_sent += 1,
                }
            }
        }
        metrics
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Partial-batch-failure response returned to the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
    pub summary: BatchMetrics,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_camel_case_envelope() {
        let body = json!({
            "payload": {
                "eventId": "evt-1",
                "guestId": "guest-1",
                "recipient": { "email": "ana@example.com", "displayName": "Ana" },
                "matchSummary": {
                    "totalMatches": 4,
                    "bestScore": 0.97,
                    "averageScore": 0.88,
                    "topMatches": [{ "assetRef": "IMG_001.jpg", "score": 0.97 }]
                },
                "presentationMetadata": { "galleryLinkBase": "https://photos.example.com" }
            }
        });

        let envelope: QueueEnvelope = serde_json::from_value(body).unwrap();
        let job = envelope.payload;
        assert_eq!(job.delivery_key(), Some(DeliveryKey::new("evt-1", "guest-1")));
        let summary = job.match_summary.unwrap();
        assert_eq!(summary.total_matches, Some(json!(4)));
        assert_eq!(summary.top_matches[0].asset_ref, "IMG_001.jpg");
    }

    #[test]
    fn test_blank_ids_have_no_delivery_key() {
        let job = RawNotificationJob {
            event_id: Some("evt-1".to_string()),
            guest_id: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(job.delivery_key().is_none());
    }

    #[test]
    fn test_media_url_falls_back_to_gallery_base() {
        let photo = TopMatch {
            asset_ref: "IMG_7.jpg".to_string(),
            score: 0.9,
            url: None,
        };
        assert_eq!(
            photo.media_url("https://photos.example.com/"),
            "https://photos.example.com/photos/IMG_7.jpg"
        );
    }

    #[test]
    fn test_batch_response_wire_format() {
        let response = BatchResponse {
            batch_item_failures: vec![BatchItemFailure {
                item_identifier: "rec-2".to_string(),
            }],
            summary: BatchMetrics::default(),
            processed_at: Utc::now(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["batchItemFailures"][0]["itemIdentifier"], "rec-2");
        assert!(value.get("processedAt").is_some());
    }
}
