//! Application settings and Telegram configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DEFAULT_PAGE_SIZE;

/// Telegram API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Group whose history is tallied, in bot-API form
    /// (`-100…` for supergroups, negative for basic groups).
    pub group_id: i64,

    /// Path to the session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,

    /// How many times the initial connection is attempted.
    #[serde(default = "default_connection_retries")]
    pub connection_retries: u32,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("pushup_tally.session")
}

fn default_connection_retries() -> u32 {
    5
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(api_id: i32, api_hash: String, group_id: i64) -> Self {
        Self {
            api_id,
            api_hash,
            group_id,
            session_path: default_session_path(),
            connection_retries: default_connection_retries(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `API_ID`, `API_HASH` and `GROUP_ID` to be set.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_id: i32 = lookup("API_ID")
            .ok_or(ConfigError::MissingEnvVar("API_ID"))?
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("API_ID"))?;

        let api_hash = lookup("API_HASH").ok_or(ConfigError::MissingEnvVar("API_HASH"))?;

        let group_id: i64 = lookup("GROUP_ID")
            .ok_or(ConfigError::MissingEnvVar("GROUP_ID"))?
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("GROUP_ID"))?;

        let session_path = lookup("TG_SESSION_PATH").map_or_else(default_session_path, PathBuf::from);

        let connection_retries = lookup("TG_CONNECTION_RETRIES")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or_else(default_connection_retries);

        Ok(Self {
            api_id,
            api_hash,
            group_id,
            session_path,
            connection_retries,
        })
    }
}

/// Timezone used to bucket message timestamps into months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZoneMode {
    /// Coordinated Universal Time.
    #[default]
    Utc,
    /// The host's local timezone.
    Local,
}

impl FromStr for TimeZoneMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            _ => Err(ConfigError::Invalid("TALLY_TIMEZONE")),
        }
    }
}

impl fmt::Display for TimeZoneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utc => f.write_str("utc"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// Scan and tally settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallySettings {
    /// Maximum messages per history request.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Minimum interval between history requests in milliseconds.
    #[serde(default = "default_page_interval")]
    pub page_interval_ms: u64,

    /// How often a page fetch is retried after a flood wait.
    #[serde(default = "default_max_flood_retries")]
    pub max_flood_retries: u32,

    /// Timezone for month buckets.
    #[serde(default)]
    pub timezone: TimeZoneMode,

    /// Whether per-month subtotals are kept.
    #[serde(default = "default_track_monthly")]
    pub track_monthly: bool,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_page_interval() -> u64 {
    500
}

fn default_max_flood_retries() -> u32 {
    3
}

fn default_track_monthly() -> bool {
    true
}

impl Default for TallySettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_interval_ms: default_page_interval(),
            max_flood_retries: default_max_flood_retries(),
            timezone: TimeZoneMode::default(),
            track_monthly: default_track_monthly(),
        }
    }
}

impl TallySettings {
    /// Creates tally settings from environment variables with defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self::from_lookup_with_defaults(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup_with_defaults(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            page_interval_ms: lookup("TALLY_PAGE_INTERVAL_MS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or_else(default_page_interval),
            max_flood_retries: lookup("TALLY_MAX_FLOOD_RETRIES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or_else(default_max_flood_retries),
            timezone: lookup("TALLY_TIMEZONE")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            ..Self::default()
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = TallySettings::default();
        assert_eq!(settings.page_size, 100);
        assert_eq!(settings.page_interval_ms, 500);
        assert_eq!(settings.timezone, TimeZoneMode::Utc);
        assert!(settings.track_monthly);
    }

    #[test]
    fn test_telegram_config_new() {
        let config = TelegramConfig::new(12345, "abc123".to_owned(), -100_123);
        assert_eq!(config.api_id, 12345);
        assert_eq!(config.api_hash, "abc123");
        assert_eq!(config.group_id, -100_123);
        assert_eq!(config.session_path, PathBuf::from("pushup_tally.session"));
        assert_eq!(config.connection_retries, 5);
    }

    #[test]
    fn test_telegram_config_from_lookup() {
        let config = TelegramConfig::from_lookup(lookup_from(&[
            ("API_ID", "42"),
            ("API_HASH", "hash"),
            ("GROUP_ID", "-1001234567890"),
            ("TG_CONNECTION_RETRIES", "2"),
        ]))
        .unwrap();
        assert_eq!(config.api_id, 42);
        assert_eq!(config.group_id, -1_001_234_567_890);
        assert_eq!(config.connection_retries, 2);
    }

    #[test]
    fn test_telegram_config_missing_group() {
        let err = TelegramConfig::from_lookup(lookup_from(&[("API_ID", "42"), ("API_HASH", "hash")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("GROUP_ID")));
    }

    #[test]
    fn test_telegram_config_invalid_api_id() {
        let err = TelegramConfig::from_lookup(lookup_from(&[
            ("API_ID", "abc"),
            ("API_HASH", "hash"),
            ("GROUP_ID", "1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("API_ID")));
    }

    #[test]
    fn test_tally_settings_from_lookup() {
        let settings = TallySettings::from_lookup_with_defaults(lookup_from(&[
            ("TALLY_TIMEZONE", "Local"),
            ("TALLY_PAGE_INTERVAL_MS", "not a number"),
        ]));
        assert_eq!(settings.timezone, TimeZoneMode::Local);
        assert_eq!(settings.page_interval_ms, 500);
    }

    #[test]
    fn test_timezone_mode_parse() {
        assert_eq!("utc".parse::<TimeZoneMode>().unwrap(), TimeZoneMode::Utc);
        assert!("mars".parse::<TimeZoneMode>().is_err());
    }
}
