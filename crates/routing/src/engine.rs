use std::sync::Arc;

use {
    async_trait::async_trait,
    ferry_channels::{Connector, InboundEvent, InboundHandler},
    ferry_store::ConfigStore,
    tracing::{debug, error, warn},
};

#[cfg(feature = "metrics")]
use ferry_metrics::{counter, histogram, labels, routing as routing_metrics};

/// Outcome of routing one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Rules that matched the event's source chat.
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Fans inbound events out to the destinations configured for them.
///
/// Stateless apart from the store handle; one engine is shared by every
/// connection worker.
#[derive(Clone)]
pub struct RoutingEngine {
    store: Arc<dyn ConfigStore>,
}

impl RoutingEngine {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Deliver `event` to every destination whose rule matches it.
    ///
    /// Never fails: lookup and delivery errors are logged and counted. If the
    /// task list cannot be loaded the event is dropped; if one task's rules
    /// cannot be loaded only that task is skipped.
    pub async fn route(&self, event: &InboundEvent, connector: &dyn Connector) -> RouteReport {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let key = event.key;
        let mut report = RouteReport::default();

        let tasks = match self.store.list_active_tasks(key).await {
            Ok(tasks) => tasks,
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(routing_metrics::LOOKUP_ERRORS_TOTAL).increment(1);
                error!(
                    connection = %key,
                    source = event.source_chat_id,
                    error = %e,
                    "failed to list active tasks, dropping event"
                );
                return report;
            },
        };

        for task in tasks {
            let rules = match self
                .store
                .list_matching_rules(task.id, event.source_chat_id)
                .await
            {
                Ok(rules) => rules,
                Err(e) => {
                    #[cfg(feature = "metrics")]
                    counter!(routing_metrics::LOOKUP_ERRORS_TOTAL).increment(1);
                    warn!(
                        connection = %key,
                        task_id = task.id,
                        error = %e,
                        "failed to load routing rules, skipping task"
                    );
                    continue;
                },
            };

            for rule in rules.iter().filter(|r| r.filters_pass()) {
                report.matched += 1;
                #[cfg(feature = "metrics")]
                counter!(routing_metrics::RULES_MATCHED_TOTAL).increment(1);

                match connector
                    .forward_message(rule.destination_chat_id, &event.message, rule.forward_mode)
                    .await
                {
                    Ok(()) => {
                        report.delivered += 1;
                        #[cfg(feature = "metrics")]
                        counter!(
                            routing_metrics::FORWARDS_DELIVERED_TOTAL,
                            labels::KIND => key.kind.as_str(),
                            labels::MODE => rule.forward_mode.as_str()
                        )
                        .increment(1);
                        debug!(
                            connection = %key,
                            rule_id = rule.id,
                            task_id = task.id,
                            destination = rule.destination_chat_id,
                            mode = %rule.forward_mode,
                            "message delivered"
                        );
                    },
                    Err(e) => {
                        report.failed += 1;
                        #[cfg(feature = "metrics")]
                        counter!(
                            routing_metrics::FORWARDS_FAILED_TOTAL,
                            labels::KIND => key.kind.as_str(),
                            labels::ERROR_TYPE => e.kind().as_str()
                        )
                        .increment(1);
                        warn!(
                            connection = %key,
                            rule_id = rule.id,
                            task_id = task.id,
                            destination = rule.destination_chat_id,
                            error = %e,
                            "forward failed"
                        );
                    },
                }
            }
        }

        #[cfg(feature = "metrics")]
        histogram!(routing_metrics::ROUTE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        if report.matched > 0 {
            debug!(
                connection = %key,
                source = event.source_chat_id,
                matched = report.matched,
                delivered = report.delivered,
                failed = report.failed,
                "event routed"
            );
        }
        report
    }
}

#[async_trait]
impl InboundHandler for RoutingEngine {
    async fn handle(&self, event: &InboundEvent, connector: &dyn Connector) {
        self.route(event, connector).await;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
    };

    use {
        super::*,
        ferry_channels::{Error as ConnectorError, MessageHandle},
        ferry_common::{ChatId, ConnectionKey, ConnectionKind, ForwardMode, TaskId},
        ferry_store::{ActiveTask, Resource, RoutingRule},
        secrecy::Secret,
    };

    /// In-memory store: tasks per connection, rules per task.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub tasks: HashMap<ConnectionKey, Vec<ActiveTask>>,
        pub rules: Vec<RoutingRule>,
        pub fail_tasks: bool,
        pub fail_rules_for: HashSet<TaskId>,
    }

    impl MemoryStore {
        pub fn task(mut self, key: ConnectionKey, id: TaskId) -> Self {
            self.tasks.entry(key).or_default().push(ActiveTask { id, kind: key.kind });
            self
        }

        pub fn rule(
            mut self,
            id: i64,
            task_id: TaskId,
            src: ChatId,
            dst: ChatId,
            mode: ForwardMode,
        ) -> Self {
            self.rules.push(RoutingRule {
                id,
                task_id,
                source_chat_id: src,
                destination_chat_id: dst,
                forward_mode: mode,
                filters: serde_json::json!({}),
            });
            self
        }
    }

    #[async_trait]
    impl ConfigStore for MemoryStore {
        async fn list_active_resources_by_kind(
            &self,
            _kind: ConnectionKind,
        ) -> ferry_store::Result<Vec<Resource>> {
            Ok(Vec::new())
        }

        async fn get_resource_secret(
            &self,
            _key: ConnectionKey,
        ) -> ferry_store::Result<Option<String>> {
            Ok(None)
        }

        async fn list_active_tasks(&self, key: ConnectionKey) -> ferry_store::Result<Vec<ActiveTask>> {
            if self.fail_tasks {
                return Err(ferry_store::Error::Message("database is locked".into()));
            }
            Ok(self.tasks.get(&key).cloned().unwrap_or_default())
        }

        async fn list_matching_rules(
            &self,
            task_id: TaskId,
            source_chat_id: ChatId,
        ) -> ferry_store::Result<Vec<RoutingRule>> {
            if self.fail_rules_for.contains(&task_id) {
                return Err(ferry_store::Error::Message("disk I/O error".into()));
            }
            Ok(self
                .rules
                .iter()
                .filter(|r| r.task_id == task_id && r.source_chat_id == source_chat_id)
                .cloned()
                .collect())
        }
    }

    /// Connector that records forwards and fails for chosen destinations.
    pub(crate) struct RecordingConnector {
        pub key: ConnectionKey,
        pub failing: HashSet<ChatId>,
        pub sent: Mutex<Vec<(ChatId, MessageHandle, ForwardMode)>>,
    }

    impl RecordingConnector {
        pub fn new(key: ConnectionKey) -> Self {
            Self {
                key,
                failing: HashSet::new(),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn sent(&self) -> Vec<(ChatId, MessageHandle, ForwardMode)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for RecordingConnector {
        fn key(&self) -> ConnectionKey {
            self.key
        }

        async fn connect(&mut self, _secret: Secret<String>) -> ferry_channels::Result<()> {
            Ok(())
        }

        async fn next_event(&mut self) -> ferry_channels::Result<Option<InboundEvent>> {
            Ok(None)
        }

        async fn forward_message(
            &self,
            destination: ChatId,
            message: &MessageHandle,
            mode: ForwardMode,
        ) -> ferry_channels::Result<()> {
            if self.failing.contains(&destination) {
                return Err(ConnectorError::forward(
                    destination,
                    std::io::Error::other("chat not found"),
                ));
            }
            self.sent.lock().unwrap().push((destination, *message, mode));
            Ok(())
        }

        async fn disconnect(&mut self) -> ferry_channels::Result<()> {
            Ok(())
        }
    }

    fn event(key: ConnectionKey, chat: ChatId, message_id: i32) -> InboundEvent {
        InboundEvent::new(key, MessageHandle { chat_id: chat, message_id })
    }

    fn engine(store: MemoryStore) -> RoutingEngine {
        RoutingEngine::new(Arc::new(store))
    }

    #[tokio::test]
    async fn copies_to_matching_destination() {
        // One bot task T1 with rule R1: -1001 → -1002, copy.
        let key = ConnectionKey::bot(1);
        let store = MemoryStore::default()
            .task(key, 1)
            .rule(1, 1, -1001, -1002, ForwardMode::Copy);
        let connector = RecordingConnector::new(key);

        let report = engine(store)
            .route(&event(key, -1001, 42), &connector)
            .await;

        assert_eq!(report, RouteReport { matched: 1, delivered: 1, failed: 0 });
        assert_eq!(connector.sent(), vec![(
            -1002,
            MessageHandle { chat_id: -1001, message_id: 42 },
            ForwardMode::Copy
        )]);
    }

    #[tokio::test]
    async fn fans_out_to_every_matching_rule() {
        let key = ConnectionKey::bot(1);
        let store = MemoryStore::default()
            .task(key, 1)
            .task(key, 2)
            .rule(1, 1, -10, -20, ForwardMode::Copy)
            .rule(2, 1, -10, -30, ForwardMode::Forward)
            .rule(3, 2, -10, -40, ForwardMode::Copy);
        let connector = RecordingConnector::new(key);

        let report = engine(store).route(&event(key, -10, 5), &connector).await;

        assert_eq!(report.delivered, 3);
        let dests: Vec<_> = connector.sent().into_iter().map(|(d, _, m)| (d, m)).collect();
        assert_eq!(dests, vec![
            (-20, ForwardMode::Copy),
            (-30, ForwardMode::Forward),
            (-40, ForwardMode::Copy),
        ]);
    }

    #[tokio::test]
    async fn failed_forward_does_not_stop_the_rest() {
        let key = ConnectionKey::user(3);
        let store = MemoryStore::default()
            .task(key, 1)
            .rule(1, 1, -10, -20, ForwardMode::Forward)
            .rule(2, 1, -10, -30, ForwardMode::Forward)
            .rule(3, 1, -10, -40, ForwardMode::Forward);
        let mut connector = RecordingConnector::new(key);
        connector.failing.insert(-20);

        let report = engine(store).route(&event(key, -10, 1), &connector).await;

        assert_eq!(report, RouteReport { matched: 3, delivered: 2, failed: 1 });
        let dests: Vec<_> = connector.sent().into_iter().map(|(d, ..)| d).collect();
        assert_eq!(dests, vec![-30, -40]);
    }

    #[tokio::test]
    async fn unmatched_source_is_a_noop() {
        let key = ConnectionKey::bot(1);
        let store = MemoryStore::default()
            .task(key, 1)
            .rule(1, 1, -10, -20, ForwardMode::Copy);
        let connector = RecordingConnector::new(key);

        let report = engine(store).route(&event(key, -99, 1), &connector).await;

        assert_eq!(report, RouteReport::default());
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn connection_without_tasks_is_a_noop() {
        let store = MemoryStore::default().task(ConnectionKey::bot(1), 1);
        let other = ConnectionKey::bot(2);
        let connector = RecordingConnector::new(other);

        let report = engine(store).route(&event(other, -10, 1), &connector).await;
        assert_eq!(report, RouteReport::default());
    }

    #[tokio::test]
    async fn task_lookup_failure_drops_event() {
        let key = ConnectionKey::bot(1);
        let store = MemoryStore {
            fail_tasks: true,
            ..MemoryStore::default()
        }
        .task(key, 1)
        .rule(1, 1, -10, -20, ForwardMode::Copy);
        let connector = RecordingConnector::new(key);

        let report = engine(store).route(&event(key, -10, 1), &connector).await;
        assert_eq!(report, RouteReport::default());
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn rule_lookup_failure_skips_only_that_task() {
        let key = ConnectionKey::bot(1);
        let mut store = MemoryStore::default()
            .task(key, 1)
            .task(key, 2)
            .rule(1, 1, -10, -20, ForwardMode::Copy)
            .rule(2, 2, -10, -30, ForwardMode::Copy);
        store.fail_rules_for.insert(1);
        let connector = RecordingConnector::new(key);

        let report = engine(store).route(&event(key, -10, 1), &connector).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(connector.sent()[0].0, -30);
    }

    #[tokio::test]
    async fn handler_routes_through_engine() {
        let key = ConnectionKey::bot(1);
        let store = MemoryStore::default()
            .task(key, 1)
            .rule(1, 1, -10, -20, ForwardMode::Copy);
        let connector = RecordingConnector::new(key);
        let handler: Arc<dyn InboundHandler> = Arc::new(engine(store));

        handler.handle(&event(key, -10, 7), &connector).await;
        assert_eq!(connector.sent().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_rules_each_fire() {
        let key = ConnectionKey::bot(1);
        let store = MemoryStore::default()
            .task(key, 1)
            .rule(1, 1, -10, -20, ForwardMode::Copy)
            .rule(2, 1, -10, -20, ForwardMode::Copy);
        let connector = RecordingConnector::new(key);

        let report = engine(store).route(&event(key, -10, 3), &connector).await;

        assert_eq!(report, RouteReport { matched: 2, delivered: 2, failed: 0 });
        let message = MessageHandle { chat_id: -10, message_id: 3 };
        assert_eq!(connector.sent(), vec![
            (-20, message, ForwardMode::Copy),
            (-20, message, ForwardMode::Copy),
        ]);
    }

    mod sqlite {
        use {
            super::*,
            ferry_store::{NewResource, NewRule, NewTask, SqliteConfigStore},
            ferry_vault::Vault,
            sqlx::sqlite::SqlitePoolOptions,
        };

        /// Bot R1 with active task T1, backed by an in-memory database.
        async fn bot_with_task() -> (SqliteConfigStore, ConnectionKey, TaskId) {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .unwrap();
            ferry_store::run_migrations(&pool).await.unwrap();
            let store = SqliteConfigStore::new(pool);

            let vault = Vault::new(&ferry_vault::generate_key()).unwrap();
            let tenant = store.get_or_create_tenant(42).await.unwrap();
            let r1 = store
                .create_resource(&vault, NewResource {
                    tenant_id: tenant.id,
                    kind: ConnectionKind::GatewayBot,
                    label: Some("R1".into()),
                    secret: Secret::new("1:token".into()),
                })
                .await
                .unwrap();
            let t1 = store.create_task(NewTask::new(r1.id, "T1")).await.unwrap();
            (store, ConnectionKey::bot(r1.id), t1.id)
        }

        #[tokio::test]
        async fn copy_and_forward_scenario() {
            let (store, key, t1) = bot_with_task().await;
            store
                .add_rule(NewRule::new(t1, 100, 200, ForwardMode::Copy))
                .await
                .unwrap();
            store
                .add_rule(NewRule::new(t1, 100, 300, ForwardMode::Forward))
                .await
                .unwrap();
            let connector = RecordingConnector::new(key);

            let report = RoutingEngine::new(Arc::new(store))
                .route(&event(key, 100, 9), &connector)
                .await;

            let m = MessageHandle { chat_id: 100, message_id: 9 };
            assert_eq!(report, RouteReport { matched: 2, delivered: 2, failed: 0 });
            assert_eq!(connector.sent(), vec![
                (200, m, ForwardMode::Copy),
                (300, m, ForwardMode::Forward),
            ]);
        }

        #[tokio::test]
        async fn stored_duplicates_each_fire() {
            let (store, key, t1) = bot_with_task().await;
            for _ in 0..2 {
                store
                    .add_rule(NewRule::new(t1, 100, 200, ForwardMode::Copy))
                    .await
                    .unwrap();
            }
            let connector = RecordingConnector::new(key);

            let report = RoutingEngine::new(Arc::new(store))
                .route(&event(key, 100, 9), &connector)
                .await;

            assert_eq!(report.delivered, 2);
            let dests: Vec<_> = connector.sent().into_iter().map(|(d, _, m)| (d, m)).collect();
            assert_eq!(dests, vec![(200, ForwardMode::Copy), (200, ForwardMode::Copy)]);
        }

        #[tokio::test]
        async fn user_session_tasks_never_reach_bot_connections() {
            let (store, bot_key, _) = bot_with_task().await;
            let vault = Vault::new(&ferry_vault::generate_key()).unwrap();
            let tenant = store.get_or_create_tenant(42).await.unwrap();
            let session = store
                .create_resource(&vault, NewResource {
                    tenant_id: tenant.id,
                    kind: ConnectionKind::UserSession,
                    label: None,
                    secret: Secret::new("session".into()),
                })
                .await
                .unwrap();
            let user_task = store.create_task(NewTask::new(session.id, "U1")).await.unwrap();
            store
                .add_rule(NewRule::new(user_task.id, 100, 500, ForwardMode::Forward))
                .await
                .unwrap();
            let connector = RecordingConnector::new(bot_key);

            let report = RoutingEngine::new(Arc::new(store))
                .route(&event(bot_key, 100, 1), &connector)
                .await;

            assert_eq!(report, RouteReport::default());
            assert!(connector.sent().is_empty());
        }
    }
}
