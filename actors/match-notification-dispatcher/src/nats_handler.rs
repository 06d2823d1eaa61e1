use crate::dispatcher::BatchDispatcher;
use anyhow::{Context, Result};
use async_nats::{Client, Message, Subscriber};
use futures::StreamExt;
use notification_common::QueueBatch;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// NATS consumer for match notification batches
pub struct NatsHandler {
    nats_client: Client,
    dispatcher: Arc<BatchDispatcher>,
    subject: String,
}

impl NatsHandler {
    pub fn new(nats_client: Client, dispatcher: Arc<BatchDispatcher>, subject: String) -> Self {
        Self {
            nats_client,
            dispatcher,
            subject,
        }
    }

    /// Start listening for batches on the configured subject
    pub async fn start(&self) -> Result<()> {
        info!("Subscribing to NATS subject: {}", self.subject);

        let subscriber = self
            .nats_client
            .subscribe(self.subject.clone())
            .await
            .context("Failed to subscribe to NATS subject")?;

        info!("Successfully subscribed to {}", self.subject);

        self.process_batches(subscriber).await
    }

    async fn process_batches(&self, mut subscriber: Subscriber) -> Result<()> {
        while let Some(message) = subscriber.next().await {
            if let Err(e) = self.handle_batch(message).await {
                error!("Error handling batch: {:#}", e);
            }
        }

        warn!("NATS subscription ended unexpectedly");
        Ok(())
    }

    async fn handle_batch(&self, message: Message) -> Result<()> {
        let batch: QueueBatch = serde_json::from_slice(&message.payload)
            .context("Failed to deserialize notification batch")?;

        let result = self.dispatcher.dispatch(&batch).await;
        let response = result.into_response();

        match message.reply {
            Some(reply) => {
                let body = serde_json::to_vec(&response).context("Failed to encode batch response")?;
                self.nats_client
                    .publish(reply, body.into())
                    .await
                    .context("Failed to publish batch response")?;
                debug!(
                    failures = response.batch_item_failures.len(),
                    "Published batch response"
                );
            }
            None => {
                if !response.batch_item_failures.is_empty() {
                    warn!(
                        "{} records failed and no reply subject was given",
                        response.batch_item_failures.len()
                    );
                }
            }
        }

        Ok(())
    }
}
