//! Gateway-bot connector for ferry.
//!
//! Implements [`ferry_channels::Connector`] on top of the Telegram Bot API
//! using teloxide: manual `getUpdates` long polling for group and channel
//! messages, and `copyMessage` / `forwardMessage` for delivery.

pub mod connector;
pub mod error;
pub mod updates;

pub use connector::BotConnector;
