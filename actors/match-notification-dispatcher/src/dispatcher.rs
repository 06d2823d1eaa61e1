//! Batch dispatcher
//!
//! Runs the orchestrator for every record of a queue batch, isolating failures
//! per record, and reports the records the queue should redeliver.

use crate::orchestrator::NotificationOrchestrator;
use chrono::{DateTime, Utc};
use futures::{stream, FutureExt, StreamExt};
use notification_common::{
    BatchItemFailure, BatchItemResult, BatchMetrics, BatchResponse, JobStatus, MetricsSink,
    QueueBatch, QueueEnvelope, QueueRecord,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of one batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// One entry per record, in batch order
    pub items: Vec<BatchItemResult>,
    pub metrics: BatchMetrics,
    pub processed_at: DateTime<Utc>,
}

impl BatchResult {
    /// Records the queue should redeliver: exactly the failed ones
    pub fn failed_record_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.status.is_retryable())
            .map(|item| item.record_id.clone())
            .collect()
    }

    pub fn into_response(self) -> BatchResponse {
        BatchResponse {
            batch_item_failures: self
                .failed_record_ids()
                .into_iter()
                .map(|item_identifier| BatchItemFailure { item_identifier })
                .collect(),
            summary: self.metrics,
            processed_at: self.processed_at,
        }
    }
}

pub struct BatchDispatcher {
    orchestrator: Arc<NotificationOrchestrator>,
    metrics: Option<Arc<dyn MetricsSink>>,
    max_concurrent_records: usize,
    max_receive_count: u32,
}

impl BatchDispatcher {
    pub fn new(orchestrator: Arc<NotificationOrchestrator>) -> Self {
        Self {
            orchestrator,
            metrics: None,
            max_concurrent_records: 1,
            max_receive_count: u32::MAX,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_max_concurrent_records(mut self, max_concurrent_records: usize) -> Self {
        self.max_concurrent_records = max_concurrent_records.max(1);
        self
    }

    pub fn with_max_receive_count(mut self, max_receive_count: u32) -> Self {
        self.max_receive_count = max_receive_count;
        self
    }

    pub async fn dispatch(&self, batch: &QueueBatch) -> BatchResult {
        info!("📦 Processing batch of {} records", batch.records.len());

        let items: Vec<BatchItemResult> = stream::iter(batch.records.iter())
            .map(|record| self.process_record(record))
            .buffered(self.max_concurrent_records)
            .collect()
            .await;

        let metrics = BatchMetrics::from_items(&items);
        if let Some(sink) = &self.metrics {
            if let Err(e) = sink.record_batch(&metrics).await {
                warn!("Metrics emission failed: {}", e);
            }
        }

        let result = BatchResult {
            items,
            metrics,
            processed_at: Utc::now(),
        };

        info!(
            processed = result.metrics.processed,
            sent = result.metrics.sent,
            partial = result.metrics.partial,
            skipped = result.metrics.skipped,
            failed = result.metrics.failed,
            "Batch complete"
        );
        result
    }

    async fn process_record(&self, record: &QueueRecord) -> BatchItemResult {
        if let Some(receive_count) = record.receive_count {
            if receive_count >= self.max_receive_count {
                warn!(
                    record_id = %record.record_id,
                    receive_count,
                    "Record is on its final attempt before dead-lettering"
                );
            }
        }

        let envelope: QueueEnvelope = match serde_json::from_str(&record.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(record_id = %record.record_id, "Undecodable record body: {}", e);
                return failed_item(record, format!("Failed to decode record body: {}", e));
            }
        };

        let processing = AssertUnwindSafe(self.orchestrator.process(&envelope.payload));
        match processing.catch_unwind().await {
            Ok(Ok(report)) => BatchItemResult {
                record_id: record.record_id.clone(),
                status: report.status,
                error_detail: report.error_detail,
                outcomes: report.outcomes,
            },
            Ok(Err(e)) => {
                warn!(record_id = %record.record_id, "Record failed: {}", e);
                failed_item(record, e.to_string())
            }
            Err(_) => {
                let reason = "Record processing panicked";
                error!(record_id = %record.record_id, "{}", reason);
                if let Some(key) = envelope.payload.delivery_key() {
                    self.orchestrator.record_failure(&key, reason).await;
                }
                failed_item(record, reason.to_string())
            }
        }
    }
}

fn failed_item(record: &QueueRecord, detail: String) -> BatchItemResult {
    BatchItemResult {
        record_id: record.record_id.clone(),
        status: JobStatus::Failed,
        error_detail: Some(detail),
        outcomes: Vec::new(),
    }
}
