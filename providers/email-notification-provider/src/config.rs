use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_API_BASE_URL: &str = "https://gmail.googleapis.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
    pub api_base_url: String,
    pub sender_email: String,
    pub sender_name: String,
    pub reply_to: Option<String>,
    /// Photos linked from the message body, best first
    pub max_photos: usize,
    pub request_timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            sender_email: "photos@example.com".to_string(),
            sender_name: "Event Photos".to_string(),
            reply_to: None,
            max_photos: 3,
            request_timeout_secs: 30,
        }
    }
}

impl EmailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = EmailConfig::default();
        let mut builder = Config::builder()
            .set_default("token_url", defaults.token_url)?
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default("sender_email", defaults.sender_email)?
            .set_default("sender_name", defaults.sender_name)?
            .set_default("max_photos", defaults.max_photos as u64)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?;

        // Try to load from config file if it exists
        if let Ok(config_path) = env::var("EMAIL_CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path));
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("EMAIL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let email_config: EmailConfig = config.try_deserialize()?;

        email_config.validate().map_err(ConfigError::Message)?;

        Ok(email_config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.is_empty() {
            return Err("OAuth client id is required".to_string());
        }

        if self.client_secret.is_empty() {
            return Err("OAuth client secret is required".to_string());
        }

        if self.refresh_token.is_empty() {
            return Err("OAuth refresh token is required".to_string());
        }

        if !email_address::EmailAddress::is_valid(&self.sender_email) {
            return Err(format!("Invalid sender email: {}", self.sender_email));
        }

        if let Some(reply_to) = &self.reply_to {
            if !email_address::EmailAddress::is_valid(reply_to) {
                return Err(format!("Invalid reply-to email: {}", reply_to));
            }
        }

        if self.max_photos > 10 {
            return Err("Max photos should not exceed 10".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> EmailConfig {
        EmailConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = EmailConfig::default();
        assert_eq!(
            config.validate().unwrap_err(),
            "OAuth client id is required"
        );
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let config = EmailConfig {
            sender_email: "not an address".to_string(),
            ..valid_config()
        };
        assert!(config.validate().unwrap_err().contains("sender"));
    }

    #[test]
    fn test_invalid_reply_to_rejected() {
        let config = EmailConfig {
            reply_to: Some("nope".to_string()),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }
}
