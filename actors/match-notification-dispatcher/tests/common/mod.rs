#![allow(dead_code)]

use async_trait::async_trait;
use match_notification_dispatcher::{ContactDefaults, MatchContentRenderer};
use notification_common::{
    BatchMetrics, ChannelCommit, ChannelOutcome, ChannelSender, CommitResult, ContentRenderer,
    DeliveryKey, DeliveryState, DeliveryStateStore, InMemoryDeliveryStore, MetricsError,
    MetricsSink, NotificationChannel, NotificationContent, NotificationJob, QueueEnvelope,
    QueueRecord, RawMatchSummary, RawNotificationJob, RawPresentationMetadata, RawRecipient,
    Recipient, RenderError, StoreError, TopMatch,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a scripted sender answers
#[derive(Debug, Clone)]
pub enum Script {
    Deliver,
    Defer,
    Fail(&'static str),
}

/// Channel double that counts transport calls
pub struct ScriptedSender {
    channel: NotificationChannel,
    script: Script,
    delay: Option<Duration>,
    precondition: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedSender {
    pub fn new(channel: NotificationChannel, script: Script) -> Self {
        Self {
            channel,
            script,
            delay: None,
            precondition: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn ineligible(mut self, reason: &str) -> Self {
        self.precondition = Some(reason.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for ScriptedSender {
    fn channel(&self) -> NotificationChannel {
        self.channel
    }

    fn precondition_failure(&self, _recipient: &Recipient) -> Option<String> {
        self.precondition.clone()
    }

    async fn send(&self, _recipient: &Recipient, _content: &NotificationContent) -> ChannelOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.script {
            Script::Deliver => ChannelOutcome::delivered(
                self.channel,
                Some(format!("{}-msg-{}", self.channel.as_str(), call)),
            ),
            Script::Defer => ChannelOutcome::deferred(self.channel, "queued by provider"),
            Script::Fail(detail) => ChannelOutcome::failed(self.channel, *detail, true),
        }
    }
}

pub struct FailingRenderer;

impl ContentRenderer for FailingRenderer {
    fn render(&self, _job: &NotificationJob) -> Result<NotificationContent, RenderError> {
        Err(RenderError("template exploded".to_string()))
    }
}

pub struct PanickingRenderer;

impl ContentRenderer for PanickingRenderer {
    fn render(&self, _job: &NotificationJob) -> Result<NotificationContent, RenderError> {
        panic!("renderer bug");
    }
}

/// Reads succeed, every commit fails
#[derive(Default)]
pub struct FailingCommitStore {
    pub inner: InMemoryDeliveryStore,
    pub commit_attempts: AtomicUsize,
}

#[async_trait]
impl DeliveryStateStore for FailingCommitStore {
    async fn read_delivery_state(&self, key: &DeliveryKey) -> Result<DeliveryState, StoreError> {
        self.inner.read_delivery_state(key).await
    }

    async fn commit_channel_result(
        &self,
        _key: &DeliveryKey,
        _commit: &ChannelCommit,
    ) -> Result<CommitResult, StoreError> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection reset".to_string()))
    }
}

pub struct FailingMetricsSink;

#[async_trait]
impl MetricsSink for FailingMetricsSink {
    async fn record_batch(&self, _metrics: &BatchMetrics) -> Result<(), MetricsError> {
        Err(MetricsError("sink offline".to_string()))
    }
}

pub fn renderer() -> Arc<dyn ContentRenderer> {
    Arc::new(MatchContentRenderer::new(ContactDefaults::default()).unwrap())
}

pub fn key(guest_id: &str) -> DeliveryKey {
    DeliveryKey::new("evt-1", guest_id)
}

pub fn raw_job(guest_id: &str, email: Option<&str>, phone: Option<&str>) -> RawNotificationJob {
    RawNotificationJob {
        event_id: Some("evt-1".to_string()),
        guest_id: Some(guest_id.to_string()),
        recipient: Some(RawRecipient {
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            display_name: Some("Ana".to_string()),
        }),
        match_summary: Some(RawMatchSummary {
            total_matches: Some(json!(2)),
            best_score: Some(0.95),
            average_score: Some(0.9),
            top_matches: vec![TopMatch {
                asset_ref: "IMG_1.jpg".to_string(),
                score: 0.95,
                url: None,
            }],
        }),
        presentation_metadata: Some(RawPresentationMetadata {
            event_name: Some("Spring Gala".to_string()),
            gallery_link_base: Some("https://photos.example.com".to_string()),
            ..Default::default()
        }),
    }
}

pub fn email_job(guest_id: &str) -> RawNotificationJob {
    raw_job(guest_id, Some("ana@example.com"), None)
}

pub fn record(record_id: &str, job: &RawNotificationJob) -> QueueRecord {
    let body = serde_json::to_string(&QueueEnvelope {
        payload: job.clone(),
    })
    .unwrap();

    QueueRecord {
        record_id: record_id.to_string(),
        body,
        receive_count: Some(1),
    }
}
