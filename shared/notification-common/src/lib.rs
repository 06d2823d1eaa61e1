//! Shared types and utilities for match notifications
//!
//! This library provides the job model, validation, the delivery state store
//! and the channel contract used by the dispatcher and the channel providers.

pub mod metrics;
pub mod payloads;
pub mod provider_base;
pub mod redis;
pub mod store;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use metrics::{MetricsCollector, MetricsError, MetricsSink, MetricsSnapshot};
pub use payloads::*;
pub use provider_base::{ChannelSender, ContentRenderer, ProviderError, RenderError};
pub use crate::redis::RedisDeliveryStore;
pub use store::{
    ChannelCommit, CommitResult, DeliveryStateStore, InMemoryDeliveryStore, StoreError,
};
pub use types::*;
pub use validation::*;
