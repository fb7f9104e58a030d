use std::error::Error as StdError;

use ferry_common::ChatId;

/// Crate-wide result type for connector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Connector error taxonomy.
///
/// Configuration, crypto and auth errors are fatal to a connector's startup;
/// transport errors end a running connection; forward errors are recovered by
/// the routing engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing encryption key, missing credential, missing client settings.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A stored secret failed integrity verification on decrypt.
    #[error("crypto error: {message}")]
    Crypto { message: String },

    /// The remote side rejected the credential.
    #[error("authentication rejected: {message}")]
    Auth { message: String },

    /// The underlying connection dropped or cannot be maintained.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Delivering one message to one destination failed.
    #[error("forward to {destination} failed: {source}")]
    Forward {
        destination: ChatId,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// Configuration store lookup failed.
    #[error("store lookup failed: {source}")]
    Store {
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Discriminant of [`Error`], used for log fields and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Crypto,
    Auth,
    Transport,
    Forward,
    Store,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Crypto => "crypto",
            Self::Auth => "auth",
            Self::Transport => "transport",
            Self::Forward => "forward",
            Self::Store => "store",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    #[must_use]
    pub fn configuration(message: impl std::fmt::Display) -> Self {
        Self::Configuration {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn crypto(message: impl std::fmt::Display) -> Self {
        Self::Crypto {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn auth(message: impl std::fmt::Display) -> Self {
        Self::Auth {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn forward(destination: ChatId, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Forward {
            destination,
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn store(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Store {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Crypto { .. } => ErrorKind::Crypto,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Forward { .. } => ErrorKind::Forward,
            Self::Store { .. } => ErrorKind::Store,
        }
    }
}
