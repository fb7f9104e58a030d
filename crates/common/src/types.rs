//! Identifiers shared by the store, connectors, routing engine and supervisor.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Opaque 64-bit Telegram chat identifier.
pub type ChatId = i64;

/// Primary key of a tenant resource (bot identity or user session).
pub type ResourceId = i64;

/// Primary key of a routing task.
pub type TaskId = i64;

/// Primary key of a routing rule.
pub type RuleId = i64;

/// Which kind of external connection a resource (and its tasks) runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Bot-API connection authenticated with a bot token.
    GatewayBot,
    /// User-account connection authenticated with a session string.
    UserSession,
}

impl ConnectionKind {
    pub const ALL: [Self; 2] = [Self::GatewayBot, Self::UserSession];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GatewayBot => "gateway_bot",
            Self::UserSession => "user_session",
        }
    }

    /// Short prefix used in connection keys and task names.
    fn short(self) -> &'static str {
        match self {
            Self::GatewayBot => "bot",
            Self::UserSession => "user",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ConnectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gateway_bot" | "bot" => Ok(Self::GatewayBot),
            "user_session" | "userbot" | "user" => Ok(Self::UserSession),
            _ => Err(Error::parse("connection kind", s)),
        }
    }
}

/// Identifies one supervised connection: the resource plus its kind.
///
/// Rendered as `bot:<id>` or `user:<id>` in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionKey {
    pub kind: ConnectionKind,
    pub resource_id: ResourceId,
}

impl ConnectionKey {
    #[must_use]
    pub fn new(kind: ConnectionKind, resource_id: ResourceId) -> Self {
        Self { kind, resource_id }
    }

    #[must_use]
    pub fn bot(resource_id: ResourceId) -> Self {
        Self::new(ConnectionKind::GatewayBot, resource_id)
    }

    #[must_use]
    pub fn user(resource_id: ResourceId) -> Self {
        Self::new(ConnectionKind::UserSession, resource_id)
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.short(), self.resource_id)
    }
}

impl FromStr for ConnectionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| Error::parse("connection key", s))?;
        let kind: ConnectionKind = kind.parse()?;
        let resource_id = id
            .parse::<ResourceId>()
            .map_err(|_| Error::parse("connection key", s))?;
        Ok(Self::new(kind, resource_id))
    }
}

/// How a routing rule delivers a message to its destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    /// Resend the content as a new message without attribution.
    #[default]
    Copy,
    /// Relay the message preserving the original attribution.
    Forward,
}

impl ForwardMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Forward => "forward",
        }
    }
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ForwardMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "forward" => Ok(Self::Forward),
            _ => Err(Error::parse("forward mode", s)),
        }
    }
}
