//! Route inbound messages to destination chats.
//!
//! For every inbound event the engine asks the configuration store for the
//! active tasks of the receiving connection, then for each task's rules
//! matching the source chat, and delivers the message once per matching rule
//! through the same connector that received it.
//!
//! A failed delivery never affects the other rules of the same event.

pub mod cache;
pub mod engine;

pub use {
    cache::CachedConfigStore,
    engine::{RouteReport, RoutingEngine},
};
