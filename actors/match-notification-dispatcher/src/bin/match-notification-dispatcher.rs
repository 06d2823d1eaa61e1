//! # Match Notification Dispatcher Binary
//!
//! Subscribes to the regional batch subject and delivers photo-match
//! notifications over the enabled channels.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use chat_notification_provider::ChatChannel;
use email_notification_provider::EmailChannel;
use match_notification_dispatcher::{
    BatchDispatcher, DispatcherConfig, MatchContentRenderer, NatsHandler,
    NotificationOrchestrator,
};
use notification_common::{
    ChannelSender, DeliveryStateStore, InMemoryDeliveryStore, MetricsCollector, MetricsSink,
    RedisDeliveryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DispatcherConfig::from_env().context("Failed to load dispatcher configuration")?;

    let level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("match_notification_dispatcher={}", level).parse()?)
                .add_directive(format!("notification_common={}", level).parse()?)
                .add_directive(format!("email_notification_provider={}", level).parse()?)
                .add_directive(format!("chat_notification_provider={}", level).parse()?),
        )
        .init();

    info!("🌟 Starting Match Notification Dispatcher");
    info!("Configuration:");
    info!("  REGION: {}", config.region);
    info!("  NATS_URL: {}", config.nats_url);
    info!("  SUBJECT: {}", config.batch_subject());
    info!("  EMAIL: {}", config.email_enabled);
    info!("  CHAT: {}", config.chat_enabled);

    let store: Arc<dyn DeliveryStateStore> = match &config.redis_url {
        Some(redis_url) => Arc::new(
            RedisDeliveryStore::new(redis_url, config.redis_key_prefix.clone())
                .await
                .context("Failed to connect delivery state store")?,
        ),
        None => {
            warn!("No REDIS_URL configured, delivery state is kept in memory only");
            Arc::new(InMemoryDeliveryStore::new())
        }
    };

    let mut senders: Vec<Arc<dyn ChannelSender>> = Vec::new();
    if config.email_enabled {
        let email = EmailChannel::new(config.email.clone()).context("Failed to create email channel")?;
        senders.push(Arc::new(email));
    }
    if config.chat_enabled {
        let chat = ChatChannel::new(config.chat.clone()).context("Failed to create chat channel")?;
        senders.push(Arc::new(chat));
    }

    let renderer = MatchContentRenderer::new(config.contact.clone())
        .context("Failed to compile notification templates")?;
    let orchestrator = Arc::new(NotificationOrchestrator::new(
        store,
        Arc::new(renderer),
        senders,
    ));

    let metrics = Arc::new(MetricsCollector::new());
    let dispatcher = Arc::new(
        BatchDispatcher::new(orchestrator)
            .with_metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>)
            .with_max_concurrent_records(config.max_concurrent_records)
            .with_max_receive_count(config.max_receive_count),
    );

    let nats_client = async_nats::connect(config.nats_url.as_str())
        .await
        .context("Failed to connect to NATS")?;
    info!("📡 Connected to NATS");

    let handler = NatsHandler::new(nats_client, dispatcher, config.batch_subject());

    info!("🎯 Dispatcher ready - waiting for batches");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Received shutdown signal");
        }
        result = handler.start() => {
            if let Err(e) = result {
                error!("NATS handler error: {:#}", e);
            }
        }
    }

    let snapshot = metrics.snapshot();
    info!(
        batches = snapshot.batches,
        processed = snapshot.processed,
        sent = snapshot.sent,
        partial = snapshot.partial,
        skipped = snapshot.skipped,
        failed = snapshot.failed,
        "📊 Final metrics"
    );

    info!("👋 Match Notification Dispatcher stopped");
    Ok(())
}
