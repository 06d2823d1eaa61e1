use chat_notification_provider::ChatConfig;
use config::{Config, ConfigError, Environment, File};
use email_notification_provider::EmailConfig;
use serde::{Deserialize, Serialize};
use std::env;

/// Contact details shown in every notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContactDefaults {
    pub support_email: String,
    pub website_url: String,
}

impl Default for ContactDefaults {
    fn default() -> Self {
        Self {
            support_email: "support@example.com".to_string(),
            website_url: "https://photos.example.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub region: String,
    pub nats_url: String,
    /// Defaults to `notifications.match.<region>.batch`
    pub batch_subject: Option<String>,
    /// In-memory store when absent
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub email_enabled: bool,
    pub chat_enabled: bool,
    pub max_concurrent_records: usize,
    /// Advisory; redelivery is driven by the queue
    pub max_receive_count: u32,
    pub debug: bool,
    pub contact: ContactDefaults,
    pub email: EmailConfig,
    pub chat: ChatConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            nats_url: "nats://localhost:4222".to_string(),
            batch_subject: None,
            redis_url: None,
            redis_key_prefix: notification_common::redis::DEFAULT_KEY_PREFIX.to_string(),
            email_enabled: true,
            chat_enabled: false,
            max_concurrent_records: 1,
            max_receive_count: 3,
            debug: false,
            contact: ContactDefaults::default(),
            email: EmailConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = DispatcherConfig::default();
        let mut builder = Config::builder()
            .set_default("region", defaults.region)?
            .set_default("nats_url", defaults.nats_url)?
            .set_default("redis_key_prefix", defaults.redis_key_prefix)?
            .set_default("email_enabled", defaults.email_enabled)?
            .set_default("chat_enabled", defaults.chat_enabled)?
            .set_default("max_concurrent_records", defaults.max_concurrent_records as u64)?
            .set_default("max_receive_count", defaults.max_receive_count)?
            .set_default("debug", defaults.debug)?;

        // Try to load from config file if it exists
        if let Ok(config_path) = env::var("DISPATCHER_CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path));
        }

        // Override with environment variables, e.g. DISPATCHER__CHAT__API_TOKEN
        builder = builder.add_source(
            Environment::with_prefix("DISPATCHER")
                .separator("__")
                .try_parsing(true),
        );

        let dispatcher_config: DispatcherConfig = builder.build()?.try_deserialize()?;
        dispatcher_config.validate().map_err(ConfigError::Message)?;

        Ok(dispatcher_config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.region.trim().is_empty() {
            return Err("Region is required".to_string());
        }

        if !self.email_enabled && !self.chat_enabled {
            return Err("At least one channel must be enabled".to_string());
        }

        if self.max_concurrent_records == 0 {
            return Err("max_concurrent_records must be greater than 0".to_string());
        }

        if !email_address::EmailAddress::is_valid(&self.contact.support_email) {
            return Err(format!(
                "Invalid support email: {}",
                self.contact.support_email
            ));
        }

        if self.email_enabled {
            self.email.validate().map_err(|e| format!("email: {}", e))?;
        }

        if self.chat_enabled {
            self.chat.validate().map_err(|e| format!("chat: {}", e))?;
        }

        Ok(())
    }

    pub fn batch_subject(&self) -> String {
        self.batch_subject
            .clone()
            .unwrap_or_else(|| format!("notifications.match.{}.batch", self.region))
    }
}
