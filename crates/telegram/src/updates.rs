//! Selection of routable messages from Bot API updates.

use {
    ferry_channels::MessageHandle,
    teloxide::types::{ChatKind, Message, PublicChatKind, Update, UpdateKind},
};

/// Broad chat category of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatClass {
    Private,
    Group,
    Channel,
}

#[must_use]
pub fn classify_chat(msg: &Message) -> ChatClass {
    match msg.chat.kind {
        ChatKind::Private(_) => ChatClass::Private,
        ChatKind::Public(ref p) => match p.kind {
            PublicChatKind::Channel(_) => ChatClass::Channel,
            _ => ChatClass::Group,
        },
    }
}

/// What to do with one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// A group or channel message to hand to the router.
    Route(MessageHandle),
    /// A message in a private chat with the bot.
    PrivateChat,
    /// Any other update kind.
    Other,
}

/// Pick the routable message out of an update.
///
/// Only new messages and channel posts are considered. Private chats with the
/// bot are never routed.
#[must_use]
pub fn select(update: &Update) -> Selection {
    let msg = match &update.kind {
        UpdateKind::Message(msg) | UpdateKind::ChannelPost(msg) => msg,
        _ => return Selection::Other,
    };
    if classify_chat(msg) == ChatClass::Private {
        return Selection::PrivateChat;
    }
    Selection::Route(MessageHandle {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
    })
}
