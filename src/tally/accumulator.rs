//! Folding of single messages into the running totals.

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use super::{ChatMessage, Sender, TallyState};
use crate::config::TimeZoneMode;

/// Result of folding one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    /// The message was a count and was added to `user`'s totals.
    Counted { user: String, value: u64 },
    /// The message carried no count.
    Ignored,
}

/// Adds numeric-only messages to a [`TallyState`].
#[derive(Debug, Clone, Copy)]
pub struct Accumulator {
    timezone: TimeZoneMode,
    track_monthly: bool,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new(TimeZoneMode::Utc, true)
    }
}

impl Accumulator {
    /// Creates an accumulator bucketing months in `timezone`.
    #[must_use]
    pub const fn new(timezone: TimeZoneMode, track_monthly: bool) -> Self {
        Self {
            timezone,
            track_monthly,
        }
    }

    /// Folds one message into `state`.
    ///
    /// The watermark is raised to the message id whether or not the
    /// message carried a count.
    pub fn fold(&self, state: &mut TallyState, message: &ChatMessage) -> FoldOutcome {
        let outcome = self.count(state, message);
        state.last_processed_id = state.last_processed_id.max(message.id);
        outcome
    }

    fn count(&self, state: &mut TallyState, message: &ChatMessage) -> FoldOutcome {
        let Some(text) = message.text.as_deref() else {
            return FoldOutcome::Ignored;
        };
        let Some(value) = parse_count(text) else {
            return FoldOutcome::Ignored;
        };

        let bucket = if self.track_monthly {
            let Some(month) = year_month(message.date, self.timezone) else {
                warn!(
                    "Message {} has an unrepresentable timestamp {}, not counted",
                    message.id, message.date
                );
                return FoldOutcome::Ignored;
            };
            Some(month)
        } else {
            None
        };

        let user = user_key(&message.sender);
        let total = state.totals.entry(user.clone()).or_insert(0);
        *total = total.saturating_add(value);

        if let Some(month) = bucket {
            let subtotal = state
                .monthly
                .entry(user.clone())
                .or_default()
                .entry(month)
                .or_insert(0);
            *subtotal = subtotal.saturating_add(value);
        }

        debug!("Message {}: +{} for {}", message.id, value, user);
        FoldOutcome::Counted { user, value }
    }
}

/// Parses a message consisting of one or more ASCII digits and nothing else.
///
/// Digit strings too large for `u64` are rejected with a warning.
#[must_use]
pub fn parse_count(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match text.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring count \"{}\": {}", text, e);
            None
        }
    }
}

/// Derives the accumulation key for a sender: handle, then display name,
/// then `User <id>`.
#[must_use]
pub fn user_key(sender: &Sender) -> String {
    let non_empty = |s: &Option<String>| s.as_deref().filter(|s| !s.is_empty()).map(str::to_owned);

    non_empty(&sender.username)
        .or_else(|| non_empty(&sender.display_name))
        .unwrap_or_else(|| format!("User {}", sender.id))
}

/// Formats a Unix timestamp as `YYYY-MM` in the given timezone.
#[must_use]
pub fn year_month(epoch_secs: i64, timezone: TimeZoneMode) -> Option<String> {
    let utc = DateTime::from_timestamp(epoch_secs, 0)?;
    let formatted = match timezone {
        TimeZoneMode::Utc => utc.format("%Y-%m").to_string(),
        TimeZoneMode::Local => utc.with_timezone(&Local).format("%Y-%m").to_string(),
    };
    Some(formatted)
}
