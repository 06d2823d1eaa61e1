//! Per-job notification state machine
//!
//! RECEIVED -> validated -> STATE_CHECKED -> CHANNELS_DISPATCHED -> COMMITTED,
//! ending in one of SENT, PARTIAL, SKIPPED or FAILED. Validation is pure and
//! runs first so a rejected job costs no store read and no transport call.

use futures::future::join_all;
use notification_common::{
    validate_job, ChannelCommit, ChannelOutcome, ChannelSender, CommitResult, ContentRenderer,
    DeliveryKey, DeliveryStateStore, JobStatus, NotificationChannel, NotificationJob,
    RawNotificationJob, RenderError, StoreError, ValidationOptions,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Job-level failures surfaced to the batch dispatcher after a failure record was attempted
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Delivery state commit failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Terminal result of one job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub key: Option<DeliveryKey>,
    pub status: JobStatus,
    pub error_detail: Option<String>,
    /// Outcomes of the channels attempted in this run
    pub outcomes: Vec<ChannelOutcome>,
    /// Channels found sent before dispatch or rejected by the conditional commit
    pub already_delivered: Vec<NotificationChannel>,
}

impl JobReport {
    fn failed(key: Option<DeliveryKey>, detail: impl Into<String>) -> Self {
        Self {
            key,
            status: JobStatus::Failed,
            error_detail: Some(detail.into()),
            outcomes: Vec::new(),
            already_delivered: Vec::new(),
        }
    }
}

/// Terminal classification from success and failure counts
pub fn classify(successes: usize, failures: usize) -> JobStatus {
    match (successes, failures) {
        (0, _) => JobStatus::Failed,
        (_, 0) => JobStatus::Sent,
        _ => JobStatus::Partial,
    }
}

pub struct NotificationOrchestrator {
    store: Arc<dyn DeliveryStateStore>,
    renderer: Arc<dyn ContentRenderer>,
    /// Enabled channels only
    senders: Vec<Arc<dyn ChannelSender>>,
    validation: ValidationOptions,
}

impl NotificationOrchestrator {
    pub fn new(
        store: Arc<dyn DeliveryStateStore>,
        renderer: Arc<dyn ContentRenderer>,
        senders: Vec<Arc<dyn ChannelSender>>,
    ) -> Self {
        let chat_enabled = senders
            .iter()
            .any(|sender| sender.channel() == NotificationChannel::Chat);

        Self {
            store,
            renderer,
            senders,
            validation: ValidationOptions { chat_enabled },
        }
    }

    pub fn enabled_channels(&self) -> Vec<NotificationChannel> {
        self.senders.iter().map(|sender| sender.channel()).collect()
    }

    /// Process one job to a terminal state
    pub async fn process(&self, raw: &RawNotificationJob) -> Result<JobReport, DispatchError> {
        let key = raw.delivery_key();
        let span = info_span!(
            "notification_job",
            event_id = key.as_ref().map(|k| k.event_id.as_str()).unwrap_or("-"),
            guest_id = key.as_ref().map(|k| k.guest_id.as_str()).unwrap_or("-"),
        );

        async move {
            let job = match validate_job(raw, &self.validation) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Job rejected: {}", e);
                    let reason = e.to_string();
                    if let Some(key) = &key {
                        self.record_failure(key, &reason).await;
                    }
                    return Ok(JobReport::failed(key, reason));
                }
            };
            debug!("Job validated");

            self.process_valid(job).await
        }
        .instrument(span)
        .await
    }

    async fn process_valid(&self, job: NotificationJob) -> Result<JobReport, DispatchError> {
        let key = job.delivery_key();
        let state = self.store.get_delivery_state(&key).await;
        debug!(?state, "Delivery state checked");

        let already_sent: Vec<NotificationChannel> = self
            .enabled_channels()
            .into_iter()
            .filter(|channel| state.is_sent(*channel))
            .collect();

        if !self.senders.is_empty() && already_sent.len() == self.senders.len() {
            info!("⏭️ Every enabled channel already delivered, skipping");
            return Ok(JobReport {
                key: Some(key),
                status: JobStatus::Skipped,
                error_detail: None,
                outcomes: Vec::new(),
                already_delivered: already_sent,
            });
        }

        let mut ineligible = Vec::new();
        let mut attempt = Vec::new();
        for sender in &self.senders {
            let channel = sender.channel();
            if state.is_sent(channel) {
                continue;
            }
            match sender.precondition_failure(&job.recipient) {
                Some(reason) => {
                    debug!(%channel, "Channel not eligible: {}", reason);
                    ineligible.push((channel, reason));
                }
                None => attempt.push(Arc::clone(sender)),
            }
        }

        if attempt.is_empty() && already_sent.is_empty() {
            let detail = ineligible
                .iter()
                .map(|(channel, reason)| format!("{}: {}", channel.as_str(), reason))
                .collect::<Vec<_>>()
                .join("; ");
            let reason = format!("No channel eligible for delivery ({})", detail);
            warn!("{}", reason);
            self.record_failure(&key, &reason).await;
            return Ok(JobReport::failed(Some(key), reason));
        }

        let outcomes = if attempt.is_empty() {
            Vec::new()
        } else {
            let content = match self.renderer.render(&job) {
                Ok(content) => content,
                Err(e) => {
                    error!("Rendering failed: {}", e);
                    self.record_failure(&key, &e.to_string()).await;
                    return Err(e.into());
                }
            };

            let outcomes = join_all(
                attempt
                    .iter()
                    .map(|sender| sender.send(&job.recipient, &content)),
            )
            .await;
            debug!(attempted = outcomes.len(), "Channels dispatched");
            outcomes
        };

        let successes = outcomes.iter().filter(|o| o.success).count() + already_sent.len();
        let mut failures: Vec<(NotificationChannel, String)> = outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| {
                let detail = o.error_detail.as_deref().unwrap_or("unknown error");
                (o.channel, detail.to_string())
            })
            .collect();
        failures.extend(ineligible);

        let status = classify(successes, failures.len());
        let commit = ChannelCommit::new(outcomes.clone(), self.enabled_channels(), failures);
        let error_summary = commit.error_summary();

        let commit_result = match self.store.commit_channel_result(&key, &commit).await {
            Ok(result) => result,
            Err(e) => {
                error!("Delivery state commit failed after dispatch: {}", e);
                self.record_failure(&key, &format!("Delivery state commit failed: {}", e))
                    .await;
                return Err(e.into());
            }
        };

        let mut already_delivered = already_sent;
        if let CommitResult::AlreadyDelivered { channels } = &commit_result {
            info!(
                ?channels,
                "Concurrent attempt already recorded delivery, treating as delivered"
            );
            already_delivered.extend(channels.iter().copied());
        }
        debug!(%status, "Committed");

        match status {
            JobStatus::Sent => info!("✅ Notification sent"),
            JobStatus::Partial => warn!(
                "Notification partially sent: {}",
                error_summary.as_deref().unwrap_or_default()
            ),
            _ => warn!(
                "Notification failed: {}",
                error_summary.as_deref().unwrap_or_default()
            ),
        }

        Ok(JobReport {
            key: Some(key),
            status,
            error_detail: error_summary,
            outcomes,
            already_delivered,
        })
    }

    /// Best-effort failure record; its own failure is only logged
    pub async fn record_failure(&self, key: &DeliveryKey, reason: &str) {
        if let Err(e) = self
            .store
            .commit_channel_result(key, &ChannelCommit::failed(reason))
            .await
        {
            error!(%key, "Failed to record job failure: {}", e);
        }
    }
}
