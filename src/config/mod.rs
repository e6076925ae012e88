//! Configuration module for the push-up tally.
//!
//! Handles loading of Telegram API credentials, the target group,
//! and scan/report tuning from the process environment.

mod settings;

pub use settings::{ConfigError, TallySettings, TelegramConfig, TimeZoneMode};

/// Default location of the persisted totals file.
pub const DEFAULT_STATE_FILE: &str = "push_up_totals.json";

/// Maximum number of messages requested per history page.
pub const DEFAULT_PAGE_SIZE: usize = 100;
