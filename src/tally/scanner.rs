//! History pagination.
//!
//! The scanner is a single forward-only loop:
//! 1. Request up to `page_size` messages newer than the cursor, oldest first
//! 2. An empty page ends the scan
//! 3. Fold every message newer than the watermark captured at page start
//! 4. Move the cursor to the last message of the page and repeat
//!
//! The per-message watermark check is authoritative; the source's own
//! filtering is only a prefilter, so a source that also returns the
//! boundary message never causes a double count.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{Accumulator, ChatMessage, FoldOutcome, TallyState};
use crate::config::DEFAULT_PAGE_SIZE;

/// A chat history that can be read in pages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns up to `limit` messages with an id greater than `after_id`,
    /// ordered oldest first. An empty page means there is nothing newer.
    async fn fetch_page(&self, after_id: i64, limit: usize) -> Result<Vec<ChatMessage>, Self::Error>;
}

/// Counters describing one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Non-empty pages fetched.
    pub pages: usize,
    /// Messages received across all pages.
    pub fetched: usize,
    /// Messages that added to a total.
    pub counted: usize,
    /// Messages at or below the watermark.
    pub skipped: usize,
}

/// Walks a [`MessageSource`] from the stored watermark to the newest message.
#[derive(Debug, Clone, Copy)]
pub struct Scanner {
    accumulator: Accumulator,
    page_size: usize,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(Accumulator::default(), DEFAULT_PAGE_SIZE)
    }
}

impl Scanner {
    /// Creates a scanner. A zero page size falls back to the default.
    #[must_use]
    pub const fn new(accumulator: Accumulator, page_size: usize) -> Self {
        let page_size = if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size };
        Self {
            accumulator,
            page_size,
        }
    }

    /// Scans everything newer than `state.last_processed_id` into `state`.
    ///
    /// On error the state keeps whatever was folded before the failing
    /// fetch; persisting it is up to the caller.
    pub async fn run<S>(&self, source: &S, state: &mut TallyState) -> Result<ScanSummary, S::Error>
    where
        S: MessageSource + ?Sized,
    {
        let mut summary = ScanSummary::default();
        let mut cursor = state.last_processed_id;

        info!("Scanning messages after id {}", cursor);

        loop {
            let page = source.fetch_page(cursor, self.page_size).await?;

            let Some(last_id) = page.last().map(|m| m.id) else {
                debug!("Empty page after id {}, scan complete", cursor);
                break;
            };

            summary.pages += 1;
            summary.fetched += page.len();

            let page_floor = state.last_processed_id;
            let mut page_counted = 0;

            for message in &page {
                if message.id <= page_floor {
                    summary.skipped += 1;
                    continue;
                }
                if let FoldOutcome::Counted { .. } = self.accumulator.fold(state, message) {
                    page_counted += 1;
                }
            }
            summary.counted += page_counted;

            debug!(
                "Page {}: {} messages up to id {}, {} counted",
                summary.pages,
                page.len(),
                last_id,
                page_counted
            );

            if last_id <= cursor {
                warn!(
                    "Page ending at id {} did not move past id {}, stopping scan",
                    last_id, cursor
                );
                break;
            }
            cursor = last_id;
        }

        info!(
            "Scan finished: {} pages, {} messages, {} counted, watermark {}",
            summary.pages, summary.fetched, summary.counted, state.last_processed_id
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Mutex;

    use super::*;
    use crate::config::TimeZoneMode;
    use crate::tally::{Sender, UNKNOWN_MONTH};

    // 2024-01-15T12:00:00Z and 2024-02-15T12:00:00Z
    const JAN: i64 = 1_705_320_000;
    const FEB: i64 = 1_707_998_400;

    /// In-memory chat history.
    struct FakeChat {
        messages: Vec<ChatMessage>,
        /// Also return the message whose id equals `after_id`.
        inclusive: bool,
        requests: Mutex<Vec<i64>>,
    }

    impl FakeChat {
        fn new(messages: Vec<ChatMessage>) -> Self {
            Self {
                messages,
                inclusive: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn inclusive(mut self) -> Self {
            self.inclusive = true;
            self
        }

        fn push(&mut self, message: ChatMessage) {
            self.messages.push(message);
        }
    }

    #[async_trait]
    impl MessageSource for FakeChat {
        type Error = Infallible;

        async fn fetch_page(&self, after_id: i64, limit: usize) -> Result<Vec<ChatMessage>, Infallible> {
            self.requests.lock().unwrap().push(after_id);
            Ok(self
                .messages
                .iter()
                .filter(|m| m.id > after_id || (self.inclusive && m.id == after_id))
                .take(limit)
                .cloned()
                .collect())
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Reset;

    /// Serves one page, then fails.
    struct FlakyChat {
        first: Vec<ChatMessage>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl MessageSource for FlakyChat {
        type Error = Reset;

        async fn fetch_page(&self, _after_id: i64, _limit: usize) -> Result<Vec<ChatMessage>, Reset> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 { Ok(self.first.clone()) } else { Err(Reset) }
        }
    }

    fn msg(id: i64, text: &str, username: &str, date: i64) -> ChatMessage {
        ChatMessage {
            id,
            text: Some(text.to_owned()),
            sender: Sender {
                id: 100,
                username: Some(username.to_owned()),
                display_name: None,
            },
            date,
        }
    }

    fn scenario_chat() -> FakeChat {
        FakeChat::new(vec![
            msg(1, "10", "alice", JAN),
            msg(2, "abc", "bob", JAN),
            msg(3, "20", "alice", FEB),
        ])
    }

    #[tokio::test]
    async fn test_scan_from_empty_state() {
        let chat = scenario_chat();
        let mut state = TallyState::default();

        let summary = Scanner::default().run(&chat, &mut state).await.unwrap();

        assert_eq!(state.totals.len(), 1);
        assert_eq!(state.totals.get("alice"), Some(&30));
        assert_eq!(state.monthly["alice"].get("2024-01"), Some(&10));
        assert_eq!(state.monthly["alice"].get("2024-02"), Some(&20));
        assert_eq!(state.last_processed_id, 3);
        assert_eq!(summary.counted, 2);
        assert_eq!(summary.fetched, 3);
    }

    #[tokio::test]
    async fn test_scan_resumes_from_watermark() {
        let chat = scenario_chat();
        let mut state = TallyState {
            last_processed_id: 2,
            ..TallyState::default()
        };
        state.totals.insert("alice".to_owned(), 10);

        Scanner::default().run(&chat, &mut state).await.unwrap();

        assert_eq!(state.totals.get("alice"), Some(&30));
        assert_eq!(state.last_processed_id, 3);
    }

    #[tokio::test]
    async fn test_totals_only_file_stays_consistent_with_months() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("totals.json");
        std::fs::write(&path, r#"{ "lastOffsetId": 2, "totals": { "alice": 10 } }"#).unwrap();
        let chat = scenario_chat();

        let mut state = TallyState::load(&path).unwrap();
        let track = state.settle_monthly_mode(true);
        Scanner::new(Accumulator::new(TimeZoneMode::Utc, track), DEFAULT_PAGE_SIZE)
            .run(&chat, &mut state)
            .await
            .unwrap();

        assert_eq!(state.totals.get("alice"), Some(&30));
        assert_eq!(state.monthly["alice"].get(UNKNOWN_MONTH), Some(&10));
        assert_eq!(state.monthly["alice"].get("2024-02"), Some(&20));
        assert!(state.check_consistency().is_empty());
    }

    #[tokio::test]
    async fn test_monthly_file_keeps_months_when_disabled() {
        let chat = scenario_chat();
        let mut state = TallyState::default();
        Scanner::default().run(&chat, &mut state).await.unwrap();

        let mut more = scenario_chat();
        more.push(msg(4, "5", "alice", FEB));
        let track = state.settle_monthly_mode(false);
        Scanner::new(Accumulator::new(TimeZoneMode::Utc, track), DEFAULT_PAGE_SIZE)
            .run(&more, &mut state)
            .await
            .unwrap();

        assert!(track);
        assert_eq!(state.totals.get("alice"), Some(&35));
        assert_eq!(state.monthly["alice"].get("2024-02"), Some(&25));
        assert!(state.check_consistency().is_empty());
    }

    #[tokio::test]
    async fn test_totals_only_run_writes_no_months() {
        let chat = scenario_chat();
        let mut state = TallyState::default();
        state.totals.insert("alice".to_owned(), 10);
        state.last_processed_id = 2;

        let track = state.settle_monthly_mode(false);
        Scanner::new(Accumulator::new(TimeZoneMode::Utc, track), DEFAULT_PAGE_SIZE)
            .run(&chat, &mut state)
            .await
            .unwrap();

        assert_eq!(state.totals.get("alice"), Some(&30));
        assert!(state.monthly.is_empty());
    }

    #[tokio::test]
    async fn test_second_scan_without_new_messages_changes_nothing() {
        let chat = scenario_chat();
        let mut state = TallyState::default();
        let scanner = Scanner::default();

        scanner.run(&chat, &mut state).await.unwrap();
        let after_first = state.clone();

        let summary = scanner.run(&chat, &mut state).await.unwrap();

        assert_eq!(state, after_first);
        assert_eq!(summary, ScanSummary::default());
    }

    #[tokio::test]
    async fn test_new_messages_are_folded_incrementally() {
        let mut chat = scenario_chat();
        let mut state = TallyState::default();
        let scanner = Scanner::default();

        scanner.run(&chat, &mut state).await.unwrap();
        chat.push(msg(4, "5", "bob", FEB));
        let summary = scanner.run(&chat, &mut state).await.unwrap();

        assert_eq!(summary.counted, 1);
        assert_eq!(state.totals.get("alice"), Some(&30));
        assert_eq!(state.totals.get("bob"), Some(&5));
        assert_eq!(state.last_processed_id, 4);
        assert!(state.check_consistency().is_empty());
    }

    #[tokio::test]
    async fn test_boundary_message_is_not_recounted() {
        let chat = scenario_chat().inclusive();
        let mut state = TallyState {
            last_processed_id: 1,
            ..TallyState::default()
        };
        state.totals.insert("alice".to_owned(), 10);

        let summary = Scanner::default().run(&chat, &mut state).await.unwrap();

        assert_eq!(state.totals.get("alice"), Some(&30));
        assert_eq!(state.last_processed_id, 3);
        assert!(summary.skipped >= 1);
    }

    #[tokio::test]
    async fn test_inclusive_source_terminates() {
        let chat = scenario_chat().inclusive();
        let mut state = TallyState::default();

        Scanner::default().run(&chat, &mut state).await.unwrap();

        // the last request returns only the boundary message and ends the scan
        assert_eq!(*chat.requests.lock().unwrap(), vec![0, 3]);
        assert_eq!(state.totals.get("alice"), Some(&30));
    }

    #[tokio::test]
    async fn test_pages_advance_cursor() {
        let messages = (1..=7).map(|id| msg(id, "1", "alice", JAN)).collect();
        let chat = FakeChat::new(messages);
        let mut state = TallyState::default();

        let summary = Scanner::new(Accumulator::default(), 3)
            .run(&chat, &mut state)
            .await
            .unwrap();

        assert_eq!(*chat.requests.lock().unwrap(), vec![0, 3, 6, 7]);
        assert_eq!(summary.pages, 3);
        assert_eq!(state.totals.get("alice"), Some(&7));
        assert_eq!(state.last_processed_id, 7);
    }

    #[tokio::test]
    async fn test_watermark_equals_max_seen_id() {
        let chat = FakeChat::new(vec![
            msg(5, "hello", "bob", JAN),
            msg(9, "3", "bob", JAN),
            msg(12, "no", "bob", JAN),
        ]);
        let mut state = TallyState::default();

        Scanner::default().run(&chat, &mut state).await.unwrap();

        assert_eq!(state.last_processed_id, 12);
        assert_eq!(state.totals.get("bob"), Some(&3));
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_after_partial_progress() {
        let chat = FlakyChat {
            first: vec![msg(1, "10", "alice", JAN)],
            calls: Mutex::new(0),
        };
        let mut state = TallyState::default();

        let result = Scanner::default().run(&chat, &mut state).await;

        assert!(result.is_err());
        assert_eq!(state.totals.get("alice"), Some(&10));
        assert_eq!(state.last_processed_id, 1);
    }
}
