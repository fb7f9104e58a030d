use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    ferry_channels::{ConnectorEventSink, InboundHandler},
    ferry_common::{ConnectionKey, ConnectionKind},
    ferry_store::ConfigStore,
    ferry_vault::Vault,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use ferry_metrics::{counter, labels, supervisor as sup_metrics};

use crate::{factory::ConnectorFactory, worker};

struct WorkerHandle {
    id: u64,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// State shared between the supervisor and its workers.
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) vault: Arc<Vault>,
    pub(crate) factory: Arc<dyn ConnectorFactory>,
    pub(crate) handler: Arc<dyn InboundHandler>,
    pub(crate) events: Option<Arc<dyn ConnectorEventSink>>,
    // std Mutex: never held across an await.
    workers: Mutex<HashMap<ConnectionKey, WorkerHandle>>,
    next_id: AtomicU64,
}

impl Shared {
    /// Drop the registry entry of a finished worker, unless a newer worker
    /// already replaced it.
    pub(crate) fn forget(&self, key: ConnectionKey, id: u64) {
        if let Ok(mut workers) = self.workers.lock()
            && workers.get(&key).is_some_and(|h| h.id == id)
        {
            workers.remove(&key);
        }
    }
}

/// Registry and lifecycle owner for all connection workers.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        vault: Arc<Vault>,
        factory: Arc<dyn ConnectorFactory>,
        handler: Arc<dyn InboundHandler>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                vault,
                factory,
                handler,
                events: None,
                workers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Attach a lifecycle event sink. Must be called before any worker starts.
    #[must_use]
    pub fn with_event_sink(self, sink: Arc<dyn ConnectorEventSink>) -> Self {
        let shared = match Arc::try_unwrap(self.shared) {
            Ok(mut shared) => {
                shared.events = Some(sink);
                shared
            },
            Err(shared) => {
                warn!("event sink attached to a shared supervisor, ignoring");
                return Self { shared };
            },
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Start a worker for `key` unless one is already running.
    ///
    /// Returns `true` when a new worker was spawned. Must be called from
    /// within a tokio runtime.
    pub fn ensure_running(&self, key: ConnectionKey) -> bool {
        let Ok(mut workers) = self.shared.workers.lock() else {
            warn!(connection = %key, "worker registry poisoned");
            return false;
        };
        if workers.get(&key).is_some_and(|h| !h.join.is_finished()) {
            debug!(connection = %key, "connection already running");
            return false;
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let join = tokio::spawn(worker::run(
            Arc::clone(&self.shared),
            key,
            id,
            cancel.clone(),
        ));
        workers.insert(key, WorkerHandle { id, cancel, join });
        drop(workers);

        #[cfg(feature = "metrics")]
        counter!(sup_metrics::WORKERS_SPAWNED_TOTAL, labels::KIND => key.kind.as_str())
            .increment(1);
        info!(connection = %key, "connection worker started");
        true
    }

    /// Signal the worker for `key` to stop. Does not wait for teardown.
    ///
    /// Returns `false` when no worker was registered.
    pub fn stop(&self, key: ConnectionKey) -> bool {
        let handle = match self.shared.workers.lock() {
            Ok(mut workers) => workers.remove(&key),
            Err(_) => None,
        };
        match handle {
            Some(h) => {
                h.cancel.cancel();
                info!(connection = %key, "connection worker stop requested");
                true
            },
            None => false,
        }
    }

    #[must_use]
    pub fn is_running(&self, key: ConnectionKey) -> bool {
        self.shared
            .workers
            .lock()
            .map(|w| w.get(&key).is_some_and(|h| !h.join.is_finished()))
            .unwrap_or(false)
    }

    /// Keys of live workers, sorted.
    #[must_use]
    pub fn active_keys(&self) -> Vec<ConnectionKey> {
        let mut keys: Vec<_> = self
            .shared
            .workers
            .lock()
            .map(|w| {
                w.iter()
                    .filter(|(_, h)| !h.join.is_finished())
                    .map(|(k, _)| *k)
                    .collect()
            })
            .unwrap_or_default();
        keys.sort_by_key(|k| (k.kind.as_str(), k.resource_id));
        keys
    }

    /// Start a worker for every active resource of every kind.
    ///
    /// Returns the number of workers spawned.
    pub async fn start_all(&self) -> ferry_store::Result<usize> {
        let mut started = 0;
        for kind in ConnectionKind::ALL {
            for resource in self.shared.store.list_active_resources_by_kind(kind).await? {
                if self.ensure_running(ConnectionKey::new(kind, resource.id)) {
                    started += 1;
                }
            }
        }
        info!(started, "active connections started");
        Ok(started)
    }

    /// Stop every worker and wait for all of them to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = match self.shared.workers.lock() {
            Ok(mut workers) => workers.drain().collect(),
            Err(_) => Vec::new(),
        };
        for (_, h) in &handles {
            h.cancel.cancel();
        }
        for (key, h) in handles {
            if let Err(e) = h.join.await {
                warn!(connection = %key, error = %e, "connection worker panicked");
            }
        }
        info!("all connection workers stopped");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicUsize, time::Duration};

    use {
        super::*,
        async_trait::async_trait,
        ferry_channels::{
            Connector, ConnectorEvent, ConnectorState, Error, InboundEvent, MessageHandle, Result,
        },
        ferry_common::{ChatId, ForwardMode},
        ferry_store::{ActiveTask, Resource, RoutingRule},
        secrecy::{ExposeSecret, Secret},
        tokio::sync::mpsc,
    };

    // ── Fakes ───────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct SecretStore {
        secrets: HashMap<ConnectionKey, String>,
    }

    #[async_trait]
    impl ConfigStore for SecretStore {
        async fn list_active_resources_by_kind(
            &self,
            kind: ConnectionKind,
        ) -> ferry_store::Result<Vec<Resource>> {
            let mut ids: Vec<_> = self
                .secrets
                .keys()
                .filter(|k| k.kind == kind)
                .map(|k| k.resource_id)
                .collect();
            ids.sort_unstable();
            Ok(ids
                .into_iter()
                .map(|id| Resource {
                    id,
                    tenant_id: 1,
                    kind,
                    label: None,
                    is_active: true,
                    has_secret: true,
                    created_at: 0,
                })
                .collect())
        }

        async fn get_resource_secret(
            &self,
            key: ConnectionKey,
        ) -> ferry_store::Result<Option<String>> {
            Ok(self.secrets.get(&key).cloned())
        }

        async fn list_active_tasks(&self, _: ConnectionKey) -> ferry_store::Result<Vec<ActiveTask>> {
            Ok(Vec::new())
        }

        async fn list_matching_rules(
            &self,
            _: i64,
            _: ChatId,
        ) -> ferry_store::Result<Vec<RoutingRule>> {
            Ok(Vec::new())
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Behaviour {
        /// Wait for events on the inbox channel.
        Serve,
        RejectCredential,
        /// Remote closes the stream right after connecting.
        CloseImmediately,
    }

    struct FakeConnector {
        key: ConnectionKey,
        behaviour: Behaviour,
        inbox: Option<mpsc::UnboundedReceiver<InboundEvent>>,
        tally: Arc<Tally>,
    }

    #[derive(Default)]
    struct Tally {
        created: AtomicUsize,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        secrets: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        fn key(&self) -> ConnectionKey {
            self.key
        }

        async fn connect(&mut self, secret: Secret<String>) -> Result<()> {
            self.tally.connects.fetch_add(1, Ordering::SeqCst);
            self.tally
                .secrets
                .lock()
                .unwrap()
                .push(secret.expose_secret().clone());
            if self.behaviour == Behaviour::RejectCredential {
                return Err(Error::auth("401 Unauthorized"));
            }
            Ok(())
        }

        async fn next_event(&mut self) -> Result<Option<InboundEvent>> {
            if self.behaviour == Behaviour::CloseImmediately {
                return Ok(None);
            }
            match self.inbox.as_mut() {
                Some(rx) => Ok(rx.recv().await),
                None => std::future::pending().await,
            }
        }

        async fn forward_message(
            &self,
            _destination: ChatId,
            _message: &MessageHandle,
            _mode: ForwardMode,
        ) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<()> {
            self.tally.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeFactory {
        behaviour: Behaviour,
        inbox: Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>,
        tally: Arc<Tally>,
    }

    impl ConnectorFactory for FakeFactory {
        fn create(&self, key: ConnectionKey) -> Result<Box<dyn Connector>> {
            self.tally.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeConnector {
                key,
                behaviour: self.behaviour,
                inbox: self.inbox.lock().unwrap().take(),
                tally: Arc::clone(&self.tally),
            }))
        }
    }

    /// Records handled events.
    #[derive(Default)]
    struct Recorder(Mutex<Vec<InboundEvent>>);

    #[async_trait]
    impl InboundHandler for Recorder {
        async fn handle(&self, event: &InboundEvent, _connector: &dyn Connector) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    struct ChannelSink(mpsc::UnboundedSender<ConnectorEvent>);

    #[async_trait]
    impl ConnectorEventSink for ChannelSink {
        async fn emit(&self, event: ConnectorEvent) {
            let _ = self.0.send(event);
        }
    }

    struct Harness {
        supervisor: Supervisor,
        tally: Arc<Tally>,
        recorder: Arc<Recorder>,
        events: mpsc::UnboundedReceiver<ConnectorEvent>,
        inbox: Option<mpsc::UnboundedSender<InboundEvent>>,
    }

    impl Harness {
        /// Collect lifecycle events until the worker terminates.
        async fn until_terminated(&mut self) -> Vec<ConnectorEvent> {
            let mut seen = Vec::new();
            loop {
                let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                    .await
                    .expect("worker did not terminate in time")
                    .expect("event sink closed");
                let done = matches!(event, ConnectorEvent::Terminated { .. });
                seen.push(event);
                if done {
                    return seen;
                }
            }
        }

        async fn until_state(&mut self, state: ConnectorState) {
            loop {
                let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                    .await
                    .expect("state not reached in time")
                    .expect("event sink closed");
                if matches!(event, ConnectorEvent::StateChanged { to, .. } if to == state) {
                    return;
                }
            }
        }
    }

    fn harness(behaviour: Behaviour, secrets: &[(ConnectionKey, &str)]) -> Harness {
        let vault = Arc::new(Vault::new(&ferry_vault::generate_key()).unwrap());
        let store = SecretStore {
            secrets: secrets
                .iter()
                .map(|(k, s)| (*k, vault.encrypt(s).unwrap()))
                .collect(),
        };
        harness_with_store(behaviour, store, vault)
    }

    fn harness_with_store(behaviour: Behaviour, store: SecretStore, vault: Arc<Vault>) -> Harness {
        let tally = Arc::new(Tally::default());
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder::default());
        let factory = FakeFactory {
            behaviour,
            inbox: Mutex::new(Some(inbox_rx)),
            tally: Arc::clone(&tally),
        };
        let supervisor = Supervisor::new(
            Arc::new(store),
            vault,
            Arc::new(factory),
            recorder.clone(),
        )
        .with_event_sink(Arc::new(ChannelSink(events_tx)));

        Harness {
            supervisor,
            tally,
            recorder,
            events: events_rx,
            inbox: Some(inbox_tx),
        }
    }

    fn terminal(events: &[ConnectorEvent]) -> (ConnectorState, Option<String>) {
        match events.last() {
            Some(ConnectorEvent::Terminated { state, reason, .. }) => (*state, reason.clone()),
            other => panic!("expected termination, got {other:?}"),
        }
    }

    fn transitions(events: &[ConnectorEvent]) -> Vec<(ConnectorState, ConnectorState)> {
        events
            .iter()
            .filter_map(|e| match e {
                ConnectorEvent::StateChanged { from, to, .. } => Some((*from, *to)),
                ConnectorEvent::Terminated { .. } => None,
            })
            .collect()
    }

    // ── Tests ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn ensure_running_is_idempotent() {
        let key = ConnectionKey::bot(1);
        let mut h = harness(Behaviour::Serve, &[(key, "1:token")]);

        assert!(h.supervisor.ensure_running(key));
        assert!(!h.supervisor.ensure_running(key));
        h.until_state(ConnectorState::Running).await;
        assert!(!h.supervisor.ensure_running(key));

        assert!(h.supervisor.is_running(key));
        assert_eq!(h.supervisor.active_keys(), vec![key]);
        assert_eq!(h.tally.created.load(Ordering::SeqCst), 1);
        assert_eq!(h.tally.secrets.lock().unwrap().as_slice(), ["1:token"]);
    }

    #[tokio::test]
    async fn stop_tears_down_and_reports_stopped() {
        let key = ConnectionKey::bot(1);
        let mut h = harness(Behaviour::Serve, &[(key, "t")]);
        h.supervisor.ensure_running(key);
        h.until_state(ConnectorState::Running).await;

        assert!(h.supervisor.stop(key));
        assert!(!h.supervisor.is_running(key));
        assert!(!h.supervisor.stop(key));

        let events = h.until_terminated().await;
        assert_eq!(transitions(&events), vec![
            (ConnectorState::Running, ConnectorState::Stopping),
            (ConnectorState::Stopping, ConnectorState::Stopped),
        ]);
        assert_eq!(terminal(&events), (ConnectorState::Stopped, None));
        assert_eq!(h.tally.disconnects.load(Ordering::SeqCst), 1);
        assert!(h.supervisor.active_keys().is_empty());
    }

    #[tokio::test]
    async fn stop_of_unknown_key_is_a_noop() {
        let h = harness(Behaviour::Serve, &[]);
        assert!(!h.supervisor.stop(ConnectionKey::user(9)));
    }

    #[tokio::test]
    async fn events_reach_the_handler() {
        let key = ConnectionKey::user(2);
        let mut h = harness(Behaviour::Serve, &[(key, "session")]);
        h.supervisor.ensure_running(key);
        h.until_state(ConnectorState::Running).await;

        let inbox = h.inbox.take().unwrap();
        for id in 1..=3 {
            inbox
                .send(InboundEvent::new(key, MessageHandle {
                    chat_id: -100,
                    message_id: id,
                }))
                .unwrap();
        }
        // Closing the inbox ends the remote stream.
        drop(inbox);

        let events = h.until_terminated().await;
        let (state, reason) = terminal(&events);
        assert_eq!(state, ConnectorState::Failed);
        assert!(reason.unwrap().contains("closed by remote"));

        let ids: Vec<_> = h
            .recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.message.message_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_secret_fails_before_connecting() {
        let key = ConnectionKey::bot(5);
        let mut h = harness(Behaviour::Serve, &[]);
        h.supervisor.ensure_running(key);

        let events = h.until_terminated().await;
        assert_eq!(transitions(&events), vec![(
            ConnectorState::Created,
            ConnectorState::Failed
        )]);
        let (state, reason) = terminal(&events);
        assert_eq!(state, ConnectorState::Failed);
        assert!(reason.unwrap().contains("configuration error"));
        assert_eq!(h.tally.created.load(Ordering::SeqCst), 0);
        assert_eq!(h.tally.connects.load(Ordering::SeqCst), 0);
        assert!(!h.supervisor.is_running(key));
    }

    #[tokio::test]
    async fn undecryptable_secret_is_a_crypto_failure() {
        let key = ConnectionKey::bot(5);
        let other = Vault::new(&ferry_vault::generate_key()).unwrap();
        let store = SecretStore {
            secrets: HashMap::from([(key, other.encrypt("t").unwrap())]),
        };
        let vault = Arc::new(Vault::new(&ferry_vault::generate_key()).unwrap());
        let mut h = harness_with_store(Behaviour::Serve, store, vault);
        h.supervisor.ensure_running(key);

        let events = h.until_terminated().await;
        assert_eq!(transitions(&events), vec![
            (ConnectorState::Created, ConnectorState::Connecting),
            (ConnectorState::Connecting, ConnectorState::Failed),
        ]);
        let (state, reason) = terminal(&events);
        assert_eq!(state, ConnectorState::Failed);
        assert!(reason.unwrap().starts_with("crypto error"));
        assert_eq!(h.tally.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_credential_fails_from_connecting() {
        let key = ConnectionKey::bot(1);
        let mut h = harness(Behaviour::RejectCredential, &[(key, "revoked")]);
        h.supervisor.ensure_running(key);

        let events = h.until_terminated().await;
        assert_eq!(transitions(&events), vec![
            (ConnectorState::Created, ConnectorState::Connecting),
            (ConnectorState::Connecting, ConnectorState::Failed),
        ]);
        assert!(terminal(&events).1.unwrap().contains("authentication rejected"));
        assert_eq!(h.tally.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_worker_is_not_restarted_but_can_be_started_again() {
        let key = ConnectionKey::bot(1);
        let mut h = harness(Behaviour::CloseImmediately, &[(key, "t")]);
        h.supervisor.ensure_running(key);
        h.until_terminated().await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.tally.created.load(Ordering::SeqCst), 1);
        assert!(!h.supervisor.is_running(key));

        assert!(h.supervisor.ensure_running(key));
        h.until_terminated().await;
        assert_eq!(h.tally.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn start_all_and_shutdown() {
        let bot = ConnectionKey::bot(1);
        let user = ConnectionKey::user(1);
        let h = harness(Behaviour::Serve, &[(bot, "t"), (user, "s")]);

        assert_eq!(h.supervisor.start_all().await.unwrap(), 2);
        assert_eq!(h.supervisor.active_keys(), vec![bot, user]);

        h.supervisor.shutdown().await;
        assert!(h.supervisor.active_keys().is_empty());
        assert!(!h.supervisor.is_running(bot));
    }
}
