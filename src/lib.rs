//! Push-Up Tally Library
//!
//! A Telegram userbot that totals the numeric-only messages posted to a
//! group chat.
//!
//! This crate provides the core functionality for:
//! - Loading and saving the totals file with its scan watermark
//! - Connecting to Telegram via `MTProto` and logging in interactively
//! - Paging through a group's history from the watermark
//! - Accumulating per-user and per-month totals
//! - Rendering the totals as JSON or a monthly listing

pub mod config;
pub mod tally;
pub mod telegram;
