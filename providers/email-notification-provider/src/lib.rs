pub mod client;
pub mod config;
pub mod formatter;
pub mod oauth;
pub mod provider;

pub use client::{GmailClient, GmailSendResponse};
pub use config::EmailConfig;
pub use formatter::{EmailFormatter, EmailPayload};
pub use oauth::OAuthTokenSource;
pub use provider::EmailChannel;
