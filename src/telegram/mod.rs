//! Telegram client wrapper module.
//!
//! Provides high-level abstractions for interacting with Telegram:
//! authentication, group lookup, and paged history reads.

mod client;
mod group;
mod history;
mod rate_limiter;
mod session;

pub use client::{TelegramBot, TelegramError};
pub use group::{GroupPeer, GroupRef};
pub use history::GroupHistory;
pub use rate_limiter::RateLimiter;
pub use session::{InteractiveLogin, LoginPrompt, decode_credential, encode_credential, prepare_session_file};
