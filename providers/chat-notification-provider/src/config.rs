use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_base_url: String,
    pub api_token: String,
    pub session: String,
    /// Media attachments sent after the text, best first
    pub max_media: usize,
    pub min_pre_send_delay_ms: u64,
    pub max_pre_send_delay_ms: u64,
    pub media_delay_ms: u64,
    /// Bound on the whole composite send
    pub send_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            api_token: String::new(),
            session: "default".to_string(),
            max_media: 3,
            min_pre_send_delay_ms: 500,
            max_pre_send_delay_ms: 2000,
            media_delay_ms: 1500,
            send_timeout_ms: 60_000,
            request_timeout_ms: 15_000,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ChatConfig::default();
        let mut builder = Config::builder()
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default("session", defaults.session)?
            .set_default("max_media", defaults.max_media as u64)?
            .set_default("min_pre_send_delay_ms", defaults.min_pre_send_delay_ms)?
            .set_default("max_pre_send_delay_ms", defaults.max_pre_send_delay_ms)?
            .set_default("media_delay_ms", defaults.media_delay_ms)?
            .set_default("send_timeout_ms", defaults.send_timeout_ms)?
            .set_default("request_timeout_ms", defaults.request_timeout_ms)?;

        if let Ok(config_path) = env::var("CHAT_CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path));
        }

        builder = builder.add_source(
            Environment::with_prefix("CHAT")
                .separator("__")
                .try_parsing(true),
        );

        let chat_config: ChatConfig = builder.build()?.try_deserialize()?;
        chat_config.validate().map_err(ConfigError::Message)?;

        Ok(chat_config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_base_url.is_empty() {
            return Err("Chat API base URL is required".to_string());
        }

        if self.api_token.is_empty() {
            return Err("Chat API token is required".to_string());
        }

        if self.session.is_empty() {
            return Err("Chat session name is required".to_string());
        }

        if self.min_pre_send_delay_ms > self.max_pre_send_delay_ms {
            return Err("Minimum pre-send delay exceeds maximum".to_string());
        }

        if self.send_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err("Timeouts must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn media_delay(&self) -> Duration {
        Duration::from_millis(self.media_delay_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
