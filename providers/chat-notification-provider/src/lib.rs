pub mod chat_client;
pub mod config;
pub mod provider;
pub mod types;

pub use chat_client::{normalize_recipient, ChatClient};
pub use config::ChatConfig;
pub use provider::ChatChannel;
pub use types::ChatSendResult;
