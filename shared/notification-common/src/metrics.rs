//! Batch metrics sink and in-process collector
//!
//! The dispatcher reports one [`BatchMetrics`] per batch. Sinks are optional
//! and failures are never allowed to change batch results.

use crate::payloads::BatchMetrics;
use crate::types::NotificationChannel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("Failed to publish metrics: {0}")]
pub struct MetricsError(pub String);

/// Destination for per-batch counts
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_batch(&self, metrics: &BatchMetrics) -> Result<(), MetricsError>;
}

/// Cumulative counters across batches
#[derive(Debug)]
pub struct MetricsCollector {
    batches: AtomicU64,
    processed: AtomicU64,
    sent: AtomicU64,
    partial: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    channel_sent: DashMap<NotificationChannel, AtomicU64>,
    start_time: DateTime<Utc>,
    last_batch_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
}

/// Point-in-time view of the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub batches: u64,
    pub processed: u64,
    pub sent: u64,
    pub partial: u64,
    pub skipped: u64,
    pub failed: u64,
    pub failure_rate_percent: f64,
    pub channel_sent: HashMap<NotificationChannel, u64>,
    pub last_batch_at: Option<DateTime<Utc>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            batches: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            partial: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            channel_sent: DashMap::new(),
            start_time: Utc::now(),
            last_batch_at: parking_lot::RwLock::new(None),
        }
    }

    fn add_channel(&self, channel: NotificationChannel, count: u64) {
        if count == 0 {
            return;
        }
        self.channel_sent
            .entry(channel)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Utc::now();
        let processed = self.processed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);

        let failure_rate_percent = if processed > 0 {
            (failed as f64 / processed as f64) * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            timestamp: now,
            uptime_seconds: (now - self.start_time).num_seconds(),
            batches: self.batches.load(Ordering::Relaxed),
            processed,
            sent: self.sent.load(Ordering::Relaxed),
            partial: self.partial.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed,
            failure_rate_percent,
            channel_sent: self
                .channel_sent
                .iter()
                .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
                .collect(),
            last_batch_at: *self.last_batch_at.read(),
        }
    }
}

#[async_trait]
impl MetricsSink for MetricsCollector {
    async fn record_batch(&self, metrics: &BatchMetrics) -> Result<(), MetricsError> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(metrics.processed, Ordering::Relaxed);
        self.sent.fetch_add(metrics.sent, Ordering::Relaxed);
        self.partial.fetch_add(metrics.partial, Ordering::Relaxed);
        self.skipped.fetch_add(metrics.skipped, Ordering::Relaxed);
        self.failed.fetch_add(metrics.failed, Ordering::Relaxed);
        self.add_channel(NotificationChannel::Email, metrics.email_sent);
        self.add_channel(NotificationChannel::Chat, metrics.chat_sent);
        *self.last_batch_at.write() = Some(Utc::now());

        debug!(
            processed = metrics.processed,
            failed = metrics.failed,
            "Recorded batch metrics"
        );
        Ok(())
    }
}
