//! Chat messages as seen by the tally.

/// Author of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sender {
    /// Platform identifier of the sender.
    pub id: i64,
    /// Public handle, without the leading `@`.
    pub username: Option<String>,
    /// Display name (first name for users, title for channels).
    pub display_name: Option<String>,
}

impl Sender {
    /// Creates a sender known only by its identifier.
    #[must_use]
    pub const fn anonymous(id: i64) -> Self {
        Self {
            id,
            username: None,
            display_name: None,
        }
    }
}

/// A single message from the tallied chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Strictly increasing identifier within the chat.
    pub id: i64,
    /// Message text, if any.
    pub text: Option<String>,
    /// Who sent it.
    pub sender: Sender,
    /// Server timestamp in Unix seconds.
    pub date: i64,
}
