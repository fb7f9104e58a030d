//! User-session connector for ferry.
//!
//! A user session is a logged-in personal account driven through an MTProto
//! client behind the [`UserClient`] and [`LoginClient`] traits. This crate
//! supplies the connector semantics on top of them, the interactive login
//! state machine that produces a session string, and a grammers-based
//! implementation of both traits in [`mtproto`].

pub mod client;
pub mod connector;
pub mod login;
pub mod mtproto;

pub use {
    client::{ApiCredentials, ClientError, UserClient},
    connector::UserConnector,
    login::{CodeToken, LoginClient, LoginError, LoginFlow, LoginStep, PasswordToken, SignIn},
    mtproto::{MtprotoClient, MtprotoLogin},
};
