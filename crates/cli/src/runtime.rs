//! Wiring for `ferry run`: store, vault, routing engine, connector factory
//! and supervisor.

use std::sync::Arc;

use {
    async_trait::async_trait,
    ferry_channels::{Connector, ConnectorEvent, ConnectorEventSink, ConnectorState},
    ferry_common::{ConnectionKey, ConnectionKind},
    ferry_config::{FerryConfig, TelegramConfig, UserbotConfig},
    ferry_routing::{CachedConfigStore, RoutingEngine},
    ferry_store::{ConfigStore, SqliteConfigStore},
    ferry_supervisor::{ConnectorFactory, Supervisor},
    ferry_telegram::BotConnector,
    ferry_userbot::{ApiCredentials, MtprotoClient, UserClient, UserConnector},
    ferry_vault::Vault,
    tracing::{info, warn},
};

/// Produces a fresh MTProto client for each user-session worker.
pub type UserClientFactory = Arc<dyn Fn() -> Box<dyn UserClient> + Send + Sync>;

/// Chooses the connector variant by connection kind.
pub struct KindConnectorFactory {
    telegram: TelegramConfig,
    userbot: UserbotConfig,
    user_clients: UserClientFactory,
}

impl KindConnectorFactory {
    /// User sessions run on [`MtprotoClient`] unless another backend is set.
    pub fn new(config: &FerryConfig) -> Self {
        Self {
            telegram: config.telegram.clone(),
            userbot: config.userbot.clone(),
            user_clients: Arc::new(|| Box::new(MtprotoClient::new()) as Box<dyn UserClient>),
        }
    }

    #[must_use]
    pub fn with_user_clients(mut self, factory: UserClientFactory) -> Self {
        self.user_clients = factory;
        self
    }
}

impl ConnectorFactory for KindConnectorFactory {
    fn create(&self, key: ConnectionKey) -> ferry_channels::Result<Box<dyn Connector>> {
        match key.kind {
            ConnectionKind::GatewayBot => Ok(Box::new(BotConnector::new(key, self.telegram.clone()))),
            ConnectionKind::UserSession => {
                ApiCredentials::from_config(&self.userbot)?;
                let client = (self.user_clients)();
                Ok(Box::new(UserConnector::new(key, &self.userbot, client)?))
            },
        }
    }
}

/// Writes connector lifecycle events to the log.
pub struct LogEventSink;

#[async_trait]
impl ConnectorEventSink for LogEventSink {
    async fn emit(&self, event: ConnectorEvent) {
        match event {
            ConnectorEvent::StateChanged { key, from, to } => {
                info!(connection = %key, %from, %to, "connector state changed");
            },
            ConnectorEvent::Terminated {
                key,
                state: ConnectorState::Failed,
                reason,
            } => {
                warn!(
                    connection = %key,
                    reason = reason.as_deref().unwrap_or("unknown"),
                    "connection terminated with failure; not restarting"
                );
            },
            ConnectorEvent::Terminated { key, state, .. } => {
                info!(connection = %key, %state, "connection terminated");
            },
        }
    }
}

/// Run every active connection until Ctrl-C.
pub async fn run(config: &FerryConfig) -> anyhow::Result<()> {
    ferry_metrics::init_metrics(ferry_metrics::MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        listen: config.metrics.listen.clone(),
        global_labels: Vec::new(),
    })?;

    let vault = Arc::new(Vault::from_config(&config.vault)?);
    let sqlite = SqliteConfigStore::connect(&config.database).await?;
    let store: Arc<dyn ConfigStore> =
        CachedConfigStore::wrap(Arc::new(sqlite), config.routing.cache_ttl_ms);

    if !config.userbot.is_configured() {
        warn!("userbot.api_id / userbot.api_hash not set; user sessions will fail to start");
    }

    let engine = Arc::new(RoutingEngine::new(Arc::clone(&store)));
    let factory = Arc::new(KindConnectorFactory::new(config));
    let supervisor = Supervisor::new(store, vault, factory, engine)
        .with_event_sink(Arc::new(LogEventSink));

    let started = supervisor.start_all().await?;
    info!(started, "ferry running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    supervisor.shutdown().await;
    Ok(())
}
