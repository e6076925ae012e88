//! Rate limiter for Telegram API calls.
//!
//! Spaces out history requests so a long backfill does not trigger
//! Telegram's flood wait errors.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Rate limiter that enforces minimum intervals between operations.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between allowed operations.
    min_interval: Duration,

    /// Last time an operation was performed.
    last_operation: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_operation: Mutex::new(None),
        }
    }

    /// Creates a rate limiter from milliseconds.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Waits until an operation is allowed, then marks the operation as performed.
    ///
    /// Returns the duration waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut last = self.last_operation.lock().await;

        let wait_duration = last.map_or(Duration::ZERO, |last_time| {
            self.min_interval.saturating_sub(last_time.elapsed())
        });

        if !wait_duration.is_zero() {
            debug!(
                "Rate limiter: waiting {:?} before next request",
                wait_duration
            );
            tokio::time::sleep(wait_duration).await;
        }

        *last = Some(Instant::now());
        wait_duration
    }

    /// Sleeps out a flood wait imposed by Telegram.
    pub async fn handle_flood_wait(&self, wait_seconds: u32) {
        warn!(
            "Received flood wait from Telegram: {} seconds",
            wait_seconds
        );
        tokio::time::sleep(Duration::from_secs(u64::from(wait_seconds))).await;

        let mut last = self.last_operation.lock().await;
        *last = Some(Instant::now());
    }
}
