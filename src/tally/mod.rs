//! Push-up tally core.
//!
//! Loads the persisted totals, walks a chat's history page by page
//! from the stored watermark, and folds numeric-only messages into
//! per-user and per-month counters.

mod accumulator;
mod credential;
mod message;
mod report;
mod scanner;
mod state;

pub use accumulator::{Accumulator, FoldOutcome, parse_count, user_key, year_month};
pub use credential::{CredentialError, CredentialProvider, SessionOrigin, ensure_credential};
pub use message::{ChatMessage, Sender};
pub use report::{ReportFormat, render, render_json, render_monthly};
pub use scanner::{MessageSource, ScanSummary, Scanner};
pub use state::{
    Inconsistency, MonthlyTotals, SCHEMA_VERSION, StateError, TallyState, UNKNOWN_MONTH, UserTotals,
};
