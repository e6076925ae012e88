//! Mapping of configured group identifiers onto Telegram chats.

use std::fmt;

use grammers_tl_types as tl;

/// Bot-API ids of supergroups and channels are `-(10^12 + channel_id)`.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// A configured group identifier, split by the kind of chat it addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRef {
    /// Supergroup or channel (`-100…` form).
    Channel(i64),
    /// Basic group (plain negative form).
    BasicGroup(i64),
    /// Positive id; matched against either kind.
    Bare(i64),
}

impl GroupRef {
    /// Interprets an id in the form used by bot APIs and chat exports.
    #[must_use]
    pub const fn from_bot_api_id(id: i64) -> Self {
        if id <= -CHANNEL_ID_OFFSET {
            Self::Channel(-(id + CHANNEL_ID_OFFSET))
        } else if id < 0 {
            Self::BasicGroup(-id)
        } else {
            Self::Bare(id)
        }
    }

    const fn matches_basic_group(self, chat_id: i64) -> bool {
        matches!(self, Self::BasicGroup(id) | Self::Bare(id) if id == chat_id)
    }

    const fn matches_channel(self, channel_id: i64) -> bool {
        matches!(self, Self::Channel(id) | Self::Bare(id) if id == channel_id)
    }

    /// Picks the chat this reference points at out of the account's chats.
    ///
    /// Channels without an access hash cannot be addressed and are skipped.
    pub(crate) fn find(self, chats: Vec<tl::enums::Chat>) -> Option<(String, tl::enums::InputPeer)> {
        for chat in chats {
            match chat {
                tl::enums::Chat::Chat(chat) if self.matches_basic_group(chat.id) => {
                    let peer = tl::enums::InputPeer::Chat(tl::types::InputPeerChat { chat_id: chat.id });
                    return Some((chat.title, peer));
                }
                tl::enums::Chat::Channel(channel) if self.matches_channel(channel.id) => {
                    let Some(access_hash) = channel.access_hash else {
                        continue;
                    };
                    let peer = tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
                        channel_id: channel.id,
                        access_hash,
                    });
                    return Some((channel.title, peer));
                }
                _ => {}
            }
        }
        None
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(id) => write!(f, "channel {id}"),
            Self::BasicGroup(id) => write!(f, "group {id}"),
            Self::Bare(id) => write!(f, "chat {id}"),
        }
    }
}

/// A resolved group that history can be read from.
#[derive(Debug, Clone)]
pub struct GroupPeer {
    /// Identifier as configured.
    pub id: i64,
    /// Chat title.
    pub title: String,
    pub(crate) input: tl::enums::InputPeer,
}
