//! Application configuration.
//!
//! Configuration is read from a TOML file. Secrets can be supplied through
//! environment variables instead of the file:
//!
//! - `DREDGE_TWITCH_CLIENT_SECRET`
//! - `DREDGE_TWITCH_REFRESH_TOKEN`
//! - `DREDGE_TELEGRAM_TOKEN`
//! - `DREDGE_TELEGRAM_CHAT_ID`

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service name used in logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// SQLite URL for message storage.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Address the WebSocket delivery endpoint binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub log: LogConfig,
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

fn default_service_name() -> String {
    "dredge".to_string()
}

fn default_database_url() -> String {
    "sqlite:dredge.db?mode=rwc".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub filter: Option<String>,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files. Console only when unset.
    #[serde(default)]
    pub directory: Option<String>,
}

/// Twitch application and bot account credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwitchConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Login of the bot account used for the chat session.
    pub username: String,
    /// Long-lived user refresh token of the bot account.
    #[serde(default)]
    pub refresh_token: String,
    /// Only track streams in this game/category.
    #[serde(default)]
    pub game_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between discovery cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds to wait between listing pages.
    #[serde(default = "default_page_delay_secs")]
    pub page_delay_secs: u64,
    /// Attempts per page before the cycle is aborted.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Seconds between attempts of the same page.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    60
}

fn default_page_delay_secs() -> u64 {
    3
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            page_delay_secs: default_page_delay_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// One alert rule as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertEntry {
    /// Regex matched against the message text. Empty matches everything.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub exclude_channels: Vec<String>,
    #[serde(default)]
    pub exclude_usernames: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub list: Vec<AlertEntry>,
    /// Usernames that never raise an alert.
    #[serde(default)]
    pub exclude_usernames: Vec<String>,
    /// Channels to stay joined to even while offline.
    #[serde(default)]
    pub permanent_channels: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from BotFather.
    #[serde(default)]
    pub token: String,
    /// Target chat ID.
    #[serde(default)]
    pub chat_id: String,
}

impl AppConfig {
    /// Load, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config file {}: {e}", path.display()))
        })?;

        let mut config = Self::from_toml(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("failed to parse config: {e}")))
    }

    /// Fill secrets from `lookup` (the process environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(secret) = non_empty("DREDGE_TWITCH_CLIENT_SECRET") {
            self.twitch.client_secret = secret;
        }
        if let Some(token) = non_empty("DREDGE_TWITCH_REFRESH_TOKEN") {
            self.twitch.refresh_token = token;
        }

        let telegram_token = non_empty("DREDGE_TELEGRAM_TOKEN");
        let telegram_chat = non_empty("DREDGE_TELEGRAM_CHAT_ID");
        if telegram_token.is_some() || telegram_chat.is_some() {
            let telegram = self.telegram.get_or_insert_with(TelegramConfig::default);
            if let Some(token) = telegram_token {
                telegram.token = token;
            }
            if let Some(chat_id) = telegram_chat {
                telegram.chat_id = chat_id;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("twitch.client_id", &self.twitch.client_id),
            ("twitch.client_secret", &self.twitch.client_secret),
            ("twitch.username", &self.twitch.username),
            ("twitch.refresh_token", &self.twitch.refresh_token),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::config(format!("{name} is required")));
            }
        }

        if self.discovery.retry_attempts == 0 {
            return Err(Error::config("discovery.retry_attempts must be at least 1"));
        }
        if self.discovery.interval_secs == 0 {
            return Err(Error::config("discovery.interval_secs must be positive"));
        }

        if let Some(telegram) = &self.telegram
            && (telegram.token.is_empty() != telegram.chat_id.is_empty())
        {
            return Err(Error::config(
                "telegram.token and telegram.chat_id must be set together",
            ));
        }

        Ok(())
    }
}
