//! Shared identifiers, error definitions, and utilities used across all ferry crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FerryError, FromMessage, Result},
    types::{ChatId, ConnectionKey, ConnectionKind, ForwardMode, ResourceId, RuleId, TaskId},
};
