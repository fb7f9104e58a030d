use {
    async_trait::async_trait,
    ferry_common::{ChatId, ConnectionKey, ForwardMode},
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

use crate::Result;

/// Reference to a message on the remote side, enough to copy or forward it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    /// Chat the message lives in.
    pub chat_id: ChatId,
    /// Message id within that chat.
    pub message_id: i32,
}

/// One inbound message, handed from a connector to the routing engine.
///
/// Never persisted; dropped once routing returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Connection that received the message.
    pub key: ConnectionKey,
    pub source_chat_id: ChatId,
    pub message: MessageHandle,
}

impl InboundEvent {
    #[must_use]
    pub fn new(key: ConnectionKey, message: MessageHandle) -> Self {
        Self {
            key,
            source_chat_id: message.chat_id,
            message,
        }
    }
}

/// Capability set of one external connection.
///
/// Both the gateway-bot and the user-session variants implement this; the
/// supervisor and routing engine never see anything else.
///
/// Call order: `connect` once, then `next_event` until it returns `Ok(None)`
/// or an error, then `disconnect`. `forward_message` may be called between
/// events.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connection this connector serves.
    fn key(&self) -> ConnectionKey;

    /// Authenticate with the decrypted secret and open the connection.
    async fn connect(&mut self, secret: Secret<String>) -> Result<()>;

    /// Wait for the next routable inbound message.
    ///
    /// `Ok(None)` means the remote side closed the stream; the connection is
    /// not restartable afterwards.
    async fn next_event(&mut self) -> Result<Option<InboundEvent>>;

    /// Deliver `message` to `destination`, copying or forwarding it.
    async fn forward_message(
        &self,
        destination: ChatId,
        message: &MessageHandle,
        mode: ForwardMode,
    ) -> Result<()>;

    /// Close the connection. Safe to call after a failed `connect`.
    async fn disconnect(&mut self) -> Result<()>;
}

/// Consumer of inbound events (the routing engine).
///
/// Called inline on the connection worker, one event at a time.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, event: &InboundEvent, connector: &dyn Connector);
}
