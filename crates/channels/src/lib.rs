//! Connector abstraction shared by both connection variants.
//!
//! A connector owns one live external messaging connection (a gateway bot or
//! a user session). The supervisor drives it through the [`Connector`]
//! capability trait and hands every inbound event to an [`InboundHandler`]
//! (the routing engine). Nothing outside the variant crates touches
//! variant-specific state.

pub mod connector;
pub mod error;
pub mod event;
pub mod state;

pub use {
    connector::{Connector, InboundEvent, InboundHandler, MessageHandle},
    error::{Error, ErrorKind, Result},
    event::{ConnectorEvent, ConnectorEventSink},
    state::{ConnectorState, InvalidTransition},
};
