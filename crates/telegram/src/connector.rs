use std::{collections::VecDeque, time::Duration};

use {
    async_trait::async_trait,
    ferry_channels::{Connector, Error, InboundEvent, MessageHandle, Result},
    ferry_common::{ChatId, ConnectionKey, ForwardMode},
    ferry_config::TelegramConfig,
    secrecy::{ExposeSecret, Secret},
    teloxide::{
        prelude::*,
        types::{AllowedUpdate, MessageId},
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use ferry_metrics::{connector as connector_metrics, counter, histogram, labels};

use crate::{
    error::{connect_error, is_conflict},
    updates::{Selection, select},
};

/// Connector for one gateway bot, driven by manual `getUpdates` polling.
pub struct BotConnector {
    key: ConnectionKey,
    config: TelegramConfig,
    bot: Option<Bot>,
    offset: i32,
    pending: VecDeque<MessageHandle>,
    consecutive_failures: u32,
}

impl BotConnector {
    pub fn new(key: ConnectionKey, config: TelegramConfig) -> Self {
        Self {
            key,
            config,
            bot: None,
            offset: 0,
            pending: VecDeque::new(),
            consecutive_failures: 0,
        }
    }

    fn bot(&self) -> Result<&Bot> {
        self.bot
            .as_ref()
            .ok_or_else(|| Error::transport("bot connector is not connected"))
    }

    /// One long-poll round. Queues routable messages and advances the offset.
    async fn poll_once(&mut self) -> Result<()> {
        let bot = self.bot()?.clone();

        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let result = bot
            .get_updates()
            .offset(self.offset)
            .timeout(self.config.poll_timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost])
            .await;

        #[cfg(feature = "metrics")]
        histogram!(connector_metrics::POLLING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(updates) => {
                self.consecutive_failures = 0;
                debug!(connection = %self.key, count = updates.len(), "got telegram updates");
                for update in updates {
                    self.offset = update.id.as_offset();
                    match select(&update) {
                        Selection::Route(handle) => {
                            #[cfg(feature = "metrics")]
                            counter!(
                                connector_metrics::EVENTS_RECEIVED_TOTAL,
                                labels::KIND => self.key.kind.as_str()
                            )
                            .increment(1);
                            self.pending.push_back(handle);
                        },
                        Selection::PrivateChat => {
                            #[cfg(feature = "metrics")]
                            counter!(
                                connector_metrics::EVENTS_IGNORED_TOTAL,
                                labels::KIND => self.key.kind.as_str()
                            )
                            .increment(1);
                            debug!(connection = %self.key, "ignoring private chat message");
                        },
                        Selection::Other => {
                            debug!(connection = %self.key, "ignoring non-message update");
                        },
                    }
                }
                Ok(())
            },
            Err(e) if is_conflict(&e) => {
                warn!(
                    connection = %self.key,
                    "another instance is already polling with this token"
                );
                Err(Error::transport(
                    "another bot instance is already running with this token",
                ))
            },
            Err(e) => {
                self.consecutive_failures += 1;
                let limit = self.config.max_poll_failures.max(1);
                if self.consecutive_failures >= limit {
                    return Err(Error::transport(format!(
                        "getUpdates failed {} times in a row: {e}",
                        self.consecutive_failures
                    )));
                }
                warn!(
                    connection = %self.key,
                    attempt = self.consecutive_failures,
                    error = %e,
                    "telegram getUpdates failed"
                );
                tokio::time::sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
                Ok(())
            },
        }
    }
}

#[async_trait]
impl Connector for BotConnector {
    fn key(&self) -> ConnectionKey {
        self.key
    }

    async fn connect(&mut self, secret: Secret<String>) -> Result<()> {
        let token = secret.expose_secret().trim();
        if token.is_empty() {
            return Err(Error::configuration("bot token is empty"));
        }

        // Client timeout must outlast the long-poll timeout, or the HTTP
        // client aborts requests Telegram is still holding open.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(self.config.client_timeout_secs))
            .build()
            .map_err(|e| Error::configuration(format!("http client: {e}")))?;
        let bot = Bot::with_client(token, client);

        let me = bot.get_me().await.map_err(connect_error)?;
        bot.delete_webhook().send().await.map_err(connect_error)?;

        self.bot = Some(bot);
        self.offset = 0;
        self.consecutive_failures = 0;

        info!(
            connection = %self.key,
            username = ?me.username,
            "telegram bot connected (webhook cleared)"
        );
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<InboundEvent>> {
        loop {
            if let Some(handle) = self.pending.pop_front() {
                return Ok(Some(InboundEvent::new(self.key, handle)));
            }
            if let Err(e) = self.poll_once().await {
                #[cfg(feature = "metrics")]
                counter!(
                    connector_metrics::FAILURES_TOTAL,
                    labels::KIND => self.key.kind.as_str(),
                    labels::ERROR_TYPE => e.kind().as_str()
                )
                .increment(1);
                return Err(e);
            }
        }
    }

    async fn forward_message(
        &self,
        destination: ChatId,
        message: &MessageHandle,
        mode: ForwardMode,
    ) -> Result<()> {
        let bot = self.bot()?;
        #[allow(unused_qualifications)]
        let to = teloxide::types::ChatId(destination);
        #[allow(unused_qualifications)]
        let from = teloxide::types::ChatId(message.chat_id);
        let id = MessageId(message.message_id);

        match mode {
            ForwardMode::Copy => bot.copy_message(to, from, id).await.map(|_| ()),
            ForwardMode::Forward => bot.forward_message(to, from, id).await.map(|_| ()),
        }
        .map_err(|e| Error::forward(destination, e))
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.bot.take().is_some() {
            info!(connection = %self.key, "telegram bot disconnected");
        }
        self.pending.clear();
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_token_is_a_configuration_error() {
        let mut c = BotConnector::new(ConnectionKey::bot(1), TelegramConfig::default());
        let err = c.connect(Secret::new("  ".into())).await.unwrap_err();
        assert_eq!(err.kind(), ferry_channels::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn unconnected_connector_refuses_work() {
        let mut c = BotConnector::new(ConnectionKey::bot(1), TelegramConfig::default());
        let handle = MessageHandle {
            chat_id: -1,
            message_id: 1,
        };
        let err = c
            .forward_message(-2, &handle, ForwardMode::Copy)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ferry_channels::ErrorKind::Transport);
        assert!(c.next_event().await.is_err());
        assert!(c.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn queued_messages_drain_before_polling() {
        let key = ConnectionKey::bot(3);
        let mut c = BotConnector::new(key, TelegramConfig::default());
        c.pending.push_back(MessageHandle {
            chat_id: -10,
            message_id: 1,
        });
        c.pending.push_back(MessageHandle {
            chat_id: -10,
            message_id: 2,
        });

        let first = c.next_event().await.unwrap().unwrap();
        let second = c.next_event().await.unwrap().unwrap();
        assert_eq!((first.key, first.message.message_id), (key, 1));
        assert_eq!(second.message.message_id, 2);
    }
}
