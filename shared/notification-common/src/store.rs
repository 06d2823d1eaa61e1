//! Delivery state store contract
//!
//! The store is the only shared mutable resource of the dispatcher. Reads are a
//! projection of the per-channel `sent` flags; writes go through a single
//! conditional commit that never overwrites a channel already marked sent.

use crate::types::{
    ChannelOutcome, ChannelStatus, DeliveryKey, DeliveryRecord, DeliveryState,
    NotificationChannel, NotificationStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// State store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Malformed delivery record {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// One multi-field update of a delivery record
///
/// The persisted aggregate is derived inside the atomic update from the sent
/// flags the record holds afterwards, so concurrent runs converge on the same
/// status regardless of which one commits last.
#[derive(Debug, Clone)]
pub struct ChannelCommit {
    /// Attempted channels; successes are written under a not-yet-sent condition
    pub outcomes: Vec<ChannelOutcome>,
    /// Channels the job is delivered on
    pub channels: Vec<NotificationChannel>,
    /// Failure reasons of this run, dropped for any channel that ends up sent
    pub failures: Vec<(NotificationChannel, String)>,
    /// Job-level failure written as-is instead of the derived aggregate
    pub job_failure: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelCommit {
    pub fn new(
        outcomes: Vec<ChannelOutcome>,
        channels: Vec<NotificationChannel>,
        failures: Vec<(NotificationChannel, String)>,
    ) -> Self {
        Self {
            outcomes,
            channels,
            failures,
            job_failure: None,
            updated_at: Utc::now(),
        }
    }

    /// Unconditional failure record
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            job_failure: Some(reason.into()),
            ..Self::new(Vec::new(), Vec::new(), Vec::new())
        }
    }

    /// Every failure of this run as `channel: detail` entries
    pub fn error_summary(&self) -> Option<String> {
        join_failures(self.failures.iter())
    }
}

fn join_failures<'a>(
    failures: impl Iterator<Item = &'a (NotificationChannel, String)>,
) -> Option<String> {
    let entries: Vec<String> = failures
        .map(|(channel, detail)| format!("{}: {}", channel.as_str(), detail))
        .collect();
    (!entries.is_empty()).then(|| entries.join("; "))
}

/// Outcome of a conditional commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    /// Every successful channel in the commit was newly marked sent
    Committed,
    /// The listed channels were already marked sent; their writes were no-ops.
    /// Any other channel in the same commit was still written.
    AlreadyDelivered { channels: Vec<NotificationChannel> },
}

impl CommitResult {
    pub fn from_rejected(channels: Vec<NotificationChannel>) -> Self {
        if channels.is_empty() {
            CommitResult::Committed
        } else {
            CommitResult::AlreadyDelivered { channels }
        }
    }

    pub fn was_already_delivered(&self, channel: NotificationChannel) -> bool {
        match self {
            CommitResult::Committed => false,
            CommitResult::AlreadyDelivered { channels } => channels.contains(&channel),
        }
    }
}

/// Keyed delivery record store with conditional update support
#[async_trait]
pub trait DeliveryStateStore: Send + Sync {
    /// Raw read of the sent flags
    async fn read_delivery_state(&self, key: &DeliveryKey) -> Result<DeliveryState, StoreError>;

    /// Read the sent flags, failing open to "nothing sent" when the store
    /// cannot answer. A possible duplicate send is preferred over blocking.
    async fn get_delivery_state(&self, key: &DeliveryKey) -> DeliveryState {
        match self.read_delivery_state(key).await {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    event_id = %key.event_id,
                    guest_id = %key.guest_id,
                    "Delivery state read failed, assuming nothing sent: {}",
                    e
                );
                DeliveryState::default()
            }
        }
    }

    /// Apply a commit atomically
    async fn commit_channel_result(
        &self,
        key: &DeliveryKey,
        commit: &ChannelCommit,
    ) -> Result<CommitResult, StoreError>;
}

/// Apply a commit to a record, returning the channels whose sent write was rejected
pub(crate) fn apply_commit(
    record: &mut DeliveryRecord,
    commit: &ChannelCommit,
) -> Vec<NotificationChannel> {
    let mut rejected = Vec::new();

    for outcome in &commit.outcomes {
        let channel = record.channel_mut(outcome.channel);
        if channel.sent {
            if outcome.success {
                rejected.push(outcome.channel);
            }
            continue;
        }

        if outcome.success {
            channel.status = ChannelStatus::Sent;
            channel.sent = true;
            channel.message_id = outcome.provider_message_id.clone();
            channel.delivered_at = Some(outcome.delivered_at.unwrap_or(commit.updated_at));
            channel.deferred = outcome.deferred;
        } else {
            channel.status = ChannelStatus::Failed;
        }
    }

    match &commit.job_failure {
        Some(reason) => {
            record.notification_status = NotificationStatus::Failed;
            record.notification_error = Some(reason.clone());
        }
        None => {
            let delivered = commit
                .channels
                .iter()
                .filter(|channel| record.channel(**channel).sent)
                .count();
            let outstanding: Vec<&(NotificationChannel, String)> = commit
                .failures
                .iter()
                .filter(|(channel, _)| !record.channel(*channel).sent)
                .collect();
            record.notification_status =
                NotificationStatus::from_counts(delivered, outstanding.len());
            record.notification_error = join_failures(outstanding.into_iter());
        }
    }
    record.notification_updated_at = Some(commit.updated_at);

    rejected
}

/// Process-local store with the same conditional semantics as the Redis store
#[derive(Debug, Default)]
pub struct InMemoryDeliveryStore {
    records: Mutex<HashMap<DeliveryKey, DeliveryRecord>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, as the upstream producer would
    pub fn insert_record(&self, key: DeliveryKey, record: DeliveryRecord) {
        self.records.lock().insert(key, record);
    }

    pub fn record(&self, key: &DeliveryKey) -> Option<DeliveryRecord> {
        self.records.lock().get(key).cloned()
    }

    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeliveryStateStore for InMemoryDeliveryStore {
    async fn read_delivery_state(&self, key: &DeliveryKey) -> Result<DeliveryState, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .records
            .lock()
            .get(key)
            .map(DeliveryRecord::state)
            .unwrap_or_default())
    }

    async fn commit_channel_result(
        &self,
        key: &DeliveryKey,
        commit: &ChannelCommit,
    ) -> Result<CommitResult, StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let rejected = {
            let mut records = self.records.lock();
            let record = records.entry(key.clone()).or_default();
            apply_commit(record, commit)
        };

        if !rejected.is_empty() {
            debug!(%key, ?rejected, "Conditional write rejected for already delivered channels");
        }
        Ok(CommitResult::from_rejected(rejected))
    }
}
