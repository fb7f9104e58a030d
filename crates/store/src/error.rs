use ferry_common::{ConnectionKind, FromMessage};

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A stored enum column holds an unknown value.
    #[error(transparent)]
    Parse(#[from] ferry_common::Error),

    #[error(transparent)]
    Vault(#[from] ferry_vault::VaultError),

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: i64 },

    /// A task's kind must equal the kind of the resource it runs on.
    #[error("task kind {task} does not match resource kind {resource}")]
    KindMismatch {
        task: ConnectionKind,
        resource: ConnectionKind,
    },

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn not_found(what: &'static str, id: i64) -> Self {
        Self::NotFound { what, id }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

ferry_common::impl_context!();
