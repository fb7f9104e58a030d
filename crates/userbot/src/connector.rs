use {
    async_trait::async_trait,
    ferry_channels::{Connector, Error, InboundEvent, MessageHandle, Result},
    ferry_common::{ChatId, ConnectionKey, ConnectionKind, ForwardMode},
    ferry_config::UserbotConfig,
    secrecy::Secret,
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use ferry_metrics::{connector as connector_metrics, counter, labels};

use crate::client::{ApiCredentials, ClientError, UserClient};

/// Connector for one user session.
///
/// Every new message the session sees is routable, whatever the chat type.
/// Both forward modes use the client's native forward.
pub struct UserConnector<C: UserClient> {
    key: ConnectionKey,
    credentials: ApiCredentials,
    client: C,
    started: bool,
}

impl<C: UserClient> UserConnector<C> {
    /// Fails with a configuration error when the application credentials are
    /// missing, before any network attempt.
    pub fn new(key: ConnectionKey, config: &UserbotConfig, client: C) -> Result<Self> {
        if key.kind != ConnectionKind::UserSession {
            return Err(Error::configuration(format!(
                "{key} is not a user-session connection"
            )));
        }
        Ok(Self {
            key,
            credentials: ApiCredentials::from_config(config)?,
            client,
            started: false,
        })
    }
}

fn start_error(err: ClientError) -> Error {
    match err {
        ClientError::Unauthorized(reason) => Error::auth(format!("session rejected: {reason}")),
        other => Error::transport(other),
    }
}

#[async_trait]
impl<C: UserClient> Connector for UserConnector<C> {
    fn key(&self) -> ConnectionKey {
        self.key
    }

    async fn connect(&mut self, secret: Secret<String>) -> Result<()> {
        self.client
            .start(&self.credentials, secret)
            .await
            .map_err(start_error)?;
        self.started = true;
        info!(connection = %self.key, "user session connected");
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<InboundEvent>> {
        match self.client.next_message().await {
            Ok(Some(handle)) => {
                #[cfg(feature = "metrics")]
                counter!(
                    connector_metrics::EVENTS_RECEIVED_TOTAL,
                    labels::KIND => self.key.kind.as_str()
                )
                .increment(1);
                Ok(Some(InboundEvent::new(self.key, handle)))
            },
            Ok(None) => {
                info!(connection = %self.key, "user session disconnected by remote");
                Ok(None)
            },
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(
                    connector_metrics::FAILURES_TOTAL,
                    labels::KIND => self.key.kind.as_str(),
                    labels::ERROR_TYPE => "transport"
                )
                .increment(1);
                Err(Error::transport(e))
            },
        }
    }

    async fn forward_message(
        &self,
        destination: ChatId,
        message: &MessageHandle,
        mode: ForwardMode,
    ) -> Result<()> {
        if !self.started {
            return Err(Error::transport("user session is not connected"));
        }
        debug!(connection = %self.key, destination, %mode, "forwarding natively");
        self.client
            .forward(destination, message)
            .await
            .map_err(|e| Error::forward(destination, e))
    }

    async fn disconnect(&mut self) -> Result<()> {
        if !std::mem::take(&mut self.started) {
            return Ok(());
        }
        self.client.stop().await.map_err(Error::transport)?;
        info!(connection = %self.key, "user session stopped");
        Ok(())
    }
}
