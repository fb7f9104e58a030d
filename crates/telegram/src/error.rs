//! Mapping of Bot API failures onto the connector error taxonomy.

use {
    ferry_channels::Error,
    teloxide::{ApiError, RequestError},
};

/// Whether the Bot API rejected the token itself.
#[must_use]
pub fn is_rejected_token(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Api(ApiError::InvalidToken | ApiError::NotFound)
    )
}

/// Another `getUpdates` consumer is running with the same token.
#[must_use]
pub fn is_conflict(err: &RequestError) -> bool {
    matches!(err, RequestError::Api(ApiError::TerminatedByOtherGetUpdates))
}

/// Classify an error raised while establishing the connection.
#[must_use]
pub fn connect_error(err: RequestError) -> Error {
    if is_rejected_token(&err) {
        Error::auth(format!("bot token rejected: {err}"))
    } else {
        Error::transport(format!("bot api unreachable: {err}"))
    }
}
