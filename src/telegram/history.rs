//! Paged reads of a group's message history.

use std::collections::HashMap;

use async_trait::async_trait;
use grammers_tl_types as tl;

use super::{GroupPeer, TelegramBot, TelegramError};
use crate::tally::{ChatMessage, MessageSource, Sender};

/// The history of one resolved group, readable by the scanner.
#[derive(Debug)]
pub struct GroupHistory<'a> {
    bot: &'a TelegramBot,
    group: GroupPeer,
}

impl<'a> GroupHistory<'a> {
    #[must_use]
    pub const fn new(bot: &'a TelegramBot, group: GroupPeer) -> Self {
        Self { bot, group }
    }
}

#[async_trait]
impl MessageSource for GroupHistory<'_> {
    type Error = TelegramError;

    async fn fetch_page(&self, after_id: i64, limit: usize) -> Result<Vec<ChatMessage>, TelegramError> {
        self.bot.fetch_history(&self.group, after_id, limit).await
    }
}

/// Builds the `messages.getHistory` request for messages newer than `after_id`.
///
/// `offset_id = after_id + 1` with a negative `add_offset` walks forward
/// from the cursor; `min_id` drops anything at or below it.
pub(crate) fn history_request(
    peer: tl::enums::InputPeer,
    after_id: i64,
    limit: usize,
) -> Result<tl::functions::messages::GetHistory, TelegramError> {
    let min_id = i32::try_from(after_id).map_err(|_| TelegramError::IdOutOfRange(after_id))?;
    let offset_id = min_id
        .checked_add(1)
        .ok_or(TelegramError::IdOutOfRange(after_id))?;
    let limit = i32::try_from(limit).unwrap_or(i32::MAX);

    Ok(tl::functions::messages::GetHistory {
        peer,
        offset_id,
        offset_date: 0,
        add_offset: -limit,
        limit,
        max_id: 0,
        min_id,
        hash: 0,
    })
}

/// Turns a history response into messages newer than `after_id`, oldest first.
pub(crate) fn page_from_response(response: tl::enums::messages::Messages, after_id: i64) -> Vec<ChatMessage> {
    let (messages, users, chats) = match response {
        tl::enums::messages::Messages::Messages(m) => (m.messages, m.users, m.chats),
        tl::enums::messages::Messages::Slice(m) => (m.messages, m.users, m.chats),
        tl::enums::messages::Messages::ChannelMessages(m) => (m.messages, m.users, m.chats),
        tl::enums::messages::Messages::NotModified(_) => return Vec::new(),
    };

    let directory = SenderDirectory::new(users, chats);
    assemble_page(messages.into_iter().map(RawMessage::from), &directory, after_id)
}

/// Resolves senders, drops everything at or below `after_id` and orders the
/// rest oldest first. Telegram answers newest first.
fn assemble_page(
    messages: impl IntoIterator<Item = RawMessage>,
    directory: &SenderDirectory,
    after_id: i64,
) -> Vec<ChatMessage> {
    let mut page: Vec<ChatMessage> = messages
        .into_iter()
        .map(|message| directory.resolve(message))
        .filter(|message| message.id > after_id)
        .collect();
    page.sort_by_key(|message| message.id);
    page
}

/// One history entry stripped of its tl wrapping.
#[derive(Debug, Clone)]
struct RawMessage {
    id: i32,
    from: Option<tl::enums::Peer>,
    chat: Option<tl::enums::Peer>,
    /// `None` for service and deleted messages.
    text: Option<String>,
    date: i32,
}

impl From<tl::enums::Message> for RawMessage {
    fn from(message: tl::enums::Message) -> Self {
        match message {
            tl::enums::Message::Message(m) => Self {
                id: m.id,
                from: m.from_id,
                chat: Some(m.peer_id),
                text: Some(m.message),
                date: m.date,
            },
            tl::enums::Message::Service(m) => Self {
                id: m.id,
                from: m.from_id,
                chat: Some(m.peer_id),
                text: None,
                date: m.date,
            },
            tl::enums::Message::Empty(m) => Self {
                id: m.id,
                from: None,
                chat: m.peer_id,
                text: None,
                date: 0,
            },
        }
    }
}

/// Senders referenced by one history response.
#[derive(Debug, Default)]
struct SenderDirectory {
    users: HashMap<i64, Sender>,
    chats: HashMap<i64, Sender>,
}

impl SenderDirectory {
    fn new(users: Vec<tl::enums::User>, chats: Vec<tl::enums::Chat>) -> Self {
        let users = users.into_iter().map(|user| match user {
            tl::enums::User::User(user) => Sender {
                id: user.id,
                username: user.username,
                display_name: user.first_name,
            },
            tl::enums::User::Empty(user) => Sender::anonymous(user.id),
        });

        let chats = chats
            .into_iter()
            .filter_map(|chat| match chat {
                tl::enums::Chat::Chat(chat) => Some((chat.id, chat.title)),
                tl::enums::Chat::Channel(channel) => Some((channel.id, channel.title)),
                _ => None,
            })
            .map(|(id, title)| Sender {
                id,
                username: None,
                display_name: Some(title),
            });

        Self::from_senders(users, chats)
    }

    fn from_senders(
        users: impl IntoIterator<Item = Sender>,
        chats: impl IntoIterator<Item = Sender>,
    ) -> Self {
        Self {
            users: users.into_iter().map(|sender| (sender.id, sender)).collect(),
            chats: chats.into_iter().map(|sender| (sender.id, sender)).collect(),
        }
    }

    fn sender(&self, from: Option<&tl::enums::Peer>, chat: Option<&tl::enums::Peer>) -> Sender {
        let (id, known) = match from.or(chat) {
            Some(tl::enums::Peer::User(peer)) => (peer.user_id, self.users.get(&peer.user_id)),
            Some(tl::enums::Peer::Chat(peer)) => (peer.chat_id, self.chats.get(&peer.chat_id)),
            Some(tl::enums::Peer::Channel(peer)) => (peer.channel_id, self.chats.get(&peer.channel_id)),
            None => (0, None),
        };
        known.cloned().unwrap_or_else(|| Sender::anonymous(id))
    }

    fn resolve(&self, message: RawMessage) -> ChatMessage {
        ChatMessage {
            id: i64::from(message.id),
            sender: self.sender(message.from.as_ref(), message.chat.as_ref()),
            text: message.text,
            date: i64::from(message.date),
        }
    }
}
