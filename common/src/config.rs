// Configuration management with layered configuration (file, env)

use crate::models::{deserialize_tz, serialize_tz};
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Minimum calendar lookahead: the poll fires up to 25h ahead, plus slack
pub const MIN_LOOKAHEAD_HOURS: u32 = 26;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub trigger: TriggerConfig,
    pub calendar: CalendarConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub delivery: DeliveryConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Civil timezone all local-time math runs in. Always explicit.
    #[serde(serialize_with = "serialize_tz", deserialize_with = "deserialize_tz")]
    pub reference_timezone: Tz,
    pub poll_interval_seconds: u64,
    pub lookahead_hours: u32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_max_concurrent_actions")]
    pub max_concurrent_actions: usize,
}

fn default_max_concurrent_actions() -> usize {
    4
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CalendarMode {
    Http,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub mode: CalendarMode,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub mode: StoreMode,
    pub fired_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Telegram,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub mode: DeliveryMode,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    pub admin_chat_id: String,
    pub group_chat_id: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_api_base_url() -> String {
    crate::delivery::DEFAULT_TELEGRAM_API.to_string()
}

fn default_max_retries() -> u32 {
    crate::retry::DEFAULT_MAX_RETRIES
}

fn default_timeout_seconds() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// Prometheus listener port; 0 disables the exporter
    #[serde(default)]
    pub metrics_port: u16,
}

impl Settings {
    /// Load configuration with layered precedence: file → local file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("REMINDER")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.trigger.poll_interval_seconds == 0 {
            return Err("Trigger poll_interval_seconds must be greater than 0".to_string());
        }
        // A tick gap longer than the narrowest window could skip a poll
        if self.trigger.poll_interval_seconds > crate::schedule::POLL_WINDOW_MINUTES as u64 * 60 {
            return Err(format!(
                "Trigger poll_interval_seconds must not exceed {} seconds",
                crate::schedule::POLL_WINDOW_MINUTES * 60
            ));
        }
        if self.trigger.lookahead_hours < MIN_LOOKAHEAD_HOURS {
            return Err(format!(
                "Trigger lookahead_hours must be at least {}",
                MIN_LOOKAHEAD_HOURS
            ));
        }
        if self.trigger.max_concurrent_actions == 0 {
            return Err("Trigger max_concurrent_actions must be greater than 0".to_string());
        }

        match self.calendar.mode {
            CalendarMode::Http => {
                if self.calendar.base_url.as_deref().unwrap_or("").is_empty() {
                    return Err("Calendar base_url required when mode is 'http'".to_string());
                }
            }
            CalendarMode::File => {
                if self.calendar.path.as_deref().unwrap_or("").is_empty() {
                    return Err("Calendar path required when mode is 'file'".to_string());
                }
            }
        }

        if self.store.fired_ttl_seconds == 0 {
            return Err("Store fired_ttl_seconds must be greater than 0".to_string());
        }
        if self.store.mode == StoreMode::Redis && self.redis.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }

        if self.delivery.mode == DeliveryMode::Telegram
            && self.delivery.bot_token.as_deref().unwrap_or("").is_empty()
        {
            return Err("Delivery bot_token required when mode is 'telegram'".to_string());
        }
        if self.delivery.admin_chat_id.is_empty() {
            return Err("Delivery admin_chat_id cannot be empty".to_string());
        }
        if self.delivery.group_chat_id.is_empty() {
            return Err("Delivery group_chat_id cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trigger: TriggerConfig {
                reference_timezone: chrono_tz::Europe::Berlin,
                poll_interval_seconds: 60,
                lookahead_hours: 48,
                category: None,
                max_concurrent_actions: default_max_concurrent_actions(),
            },
            calendar: CalendarConfig {
                mode: CalendarMode::File,
                base_url: None,
                api_token: None,
                path: Some("config/events.json".to_string()),
                timeout_seconds: default_timeout_seconds(),
            },
            store: StoreConfig {
                mode: StoreMode::Memory,
                fired_ttl_seconds: 7 * 24 * 3600,
            },
            redis: RedisConfig::default(),
            delivery: DeliveryConfig {
                mode: DeliveryMode::Log,
                bot_token: None,
                api_base_url: default_api_base_url(),
                admin_chat_id: "admin".to_string(),
                group_chat_id: "group".to_string(),
                max_retries: default_max_retries(),
                timeout_seconds: default_timeout_seconds(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_zero_poll_interval() {
        let mut settings = Settings::default();
        settings.trigger.poll_interval_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_tick_longer_than_poll_window() {
        let mut settings = Settings::default();
        settings.trigger.poll_interval_seconds = 121;
        assert!(settings.validate().is_err());
        settings.trigger.poll_interval_seconds = 120;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_short_lookahead() {
        let mut settings = Settings::default();
        settings.trigger.lookahead_hours = 24;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_http_mode_without_url() {
        let mut settings = Settings::default();
        settings.calendar.mode = CalendarMode::Http;
        settings.calendar.base_url = None;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_telegram_mode_without_token() {
        let mut settings = Settings::default();
        settings.delivery.mode = DeliveryMode::Telegram;
        settings.delivery.bot_token = None;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_empty_chat_ids() {
        let mut settings = Settings::default();
        settings.delivery.group_chat_id = String::new();
        assert!(settings.validate().is_err());
    }
}
