use {
    async_trait::async_trait,
    ferry_channels::MessageHandle,
    ferry_common::ChatId,
    ferry_config::UserbotConfig,
    secrecy::Secret,
};

/// Failures reported by an MTProto client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The session or sign-in was rejected by the server.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid confirmation code")]
    InvalidCode,

    #[error("confirmation code expired")]
    CodeExpired,

    #[error("invalid password")]
    InvalidPassword,

    #[error("flood wait: retry in {0}s")]
    FloodWait(u32),

    /// Network or protocol level failure.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Application credentials every user-session client needs.
pub struct ApiCredentials {
    pub api_id: i32,
    pub api_hash: Secret<String>,
}

impl ApiCredentials {
    /// Read credentials from the `[userbot]` config section.
    pub fn from_config(config: &UserbotConfig) -> ferry_channels::Result<Self> {
        match (config.api_id, config.api_hash.clone()) {
            (Some(api_id), Some(api_hash)) if api_id > 0 => Ok(Self { api_id, api_hash }),
            _ => Err(ferry_channels::Error::configuration(
                "userbot.api_id and userbot.api_hash are required for user sessions",
            )),
        }
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"[REDACTED]")
            .finish()
    }
}

/// Connected-session surface of an MTProto client.
#[async_trait]
pub trait UserClient: Send + Sync {
    /// Open the session described by `session` (a serialized session string).
    async fn start(
        &mut self,
        credentials: &ApiCredentials,
        session: Secret<String>,
    ) -> Result<(), ClientError>;

    /// Wait for the next new message in any chat. `None` once disconnected.
    async fn next_message(&mut self) -> Result<Option<MessageHandle>, ClientError>;

    /// Forward a message natively.
    async fn forward(&self, destination: ChatId, message: &MessageHandle)
    -> Result<(), ClientError>;

    async fn stop(&mut self) -> Result<(), ClientError>;
}

#[async_trait]
impl<T: UserClient + ?Sized> UserClient for Box<T> {
    async fn start(
        &mut self,
        credentials: &ApiCredentials,
        session: Secret<String>,
    ) -> Result<(), ClientError> {
        (**self).start(credentials, session).await
    }

    async fn next_message(&mut self) -> Result<Option<MessageHandle>, ClientError> {
        (**self).next_message().await
    }

    async fn forward(
        &self,
        destination: ChatId,
        message: &MessageHandle,
    ) -> Result<(), ClientError> {
        (**self).forward(destination, message).await
    }

    async fn stop(&mut self) -> Result<(), ClientError> {
        (**self).stop().await
    }
}
