//! Match notification dispatcher
//!
//! Consumes batches of photo-match jobs and delivers each job over the enabled
//! channels at most once per (event, guest), reporting failed records back to
//! the queue for redelivery.

pub mod config;
pub mod dispatcher;
pub mod nats_handler;
pub mod orchestrator;
pub mod renderer;

pub use config::{ContactDefaults, DispatcherConfig};
pub use dispatcher::{BatchDispatcher, BatchResult};
pub use nats_handler::NatsHandler;
pub use orchestrator::{classify, DispatchError, JobReport, NotificationOrchestrator};
pub use renderer::MatchContentRenderer;
