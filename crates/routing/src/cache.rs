//! Short-lived cache in front of the routing lookups.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    ferry_common::{ChatId, ConnectionKey, ConnectionKind, TaskId},
    ferry_store::{ActiveTask, ConfigStore, Resource, Result, RoutingRule},
};

type Entries<K, V> = RwLock<HashMap<K, (V, Instant)>>;

/// [`ConfigStore`] decorator caching task and rule lookups for a fixed TTL.
///
/// Resource listing and secret reads pass straight through. Errors are never
/// cached. Admin changes become visible after at most one TTL.
pub struct CachedConfigStore {
    inner: Arc<dyn ConfigStore>,
    ttl: Duration,
    tasks: Entries<ConnectionKey, Vec<ActiveTask>>,
    rules: Entries<(TaskId, ChatId), Vec<RoutingRule>>,
}

impl CachedConfigStore {
    pub fn new(inner: Arc<dyn ConfigStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            tasks: RwLock::new(HashMap::new()),
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Wrap `inner` when `ttl_ms` is non-zero, otherwise return it unchanged.
    pub fn wrap(inner: Arc<dyn ConfigStore>, ttl_ms: u64) -> Arc<dyn ConfigStore> {
        if ttl_ms == 0 {
            inner
        } else {
            Arc::new(Self::new(inner, Duration::from_millis(ttl_ms)))
        }
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        if let Ok(mut tasks) = self.tasks.write() {
            tasks.clear();
        }
        if let Ok(mut rules) = self.rules.write() {
            rules.clear();
        }
    }

    fn get<K: Eq + Hash, V: Clone>(&self, entries: &Entries<K, V>, key: &K) -> Option<V> {
        let entries = entries.read().ok()?;
        let (value, at) = entries.get(key)?;
        (at.elapsed() < self.ttl).then(|| value.clone())
    }

    fn put<K: Eq + Hash, V>(&self, entries: &Entries<K, V>, key: K, value: V) {
        if let Ok(mut entries) = entries.write() {
            let ttl = self.ttl;
            entries.retain(|_, (_, at)| at.elapsed() < ttl);
            entries.insert(key, (value, Instant::now()));
        }
    }
}

#[async_trait]
impl ConfigStore for CachedConfigStore {
    async fn list_active_resources_by_kind(&self, kind: ConnectionKind) -> Result<Vec<Resource>> {
        self.inner.list_active_resources_by_kind(kind).await
    }

    async fn get_resource_secret(&self, key: ConnectionKey) -> Result<Option<String>> {
        self.inner.get_resource_secret(key).await
    }

    async fn list_active_tasks(&self, key: ConnectionKey) -> Result<Vec<ActiveTask>> {
        if let Some(hit) = self.get(&self.tasks, &key) {
            return Ok(hit);
        }
        let tasks = self.inner.list_active_tasks(key).await?;
        self.put(&self.tasks, key, tasks.clone());
        Ok(tasks)
    }

    async fn list_matching_rules(
        &self,
        task_id: TaskId,
        source_chat_id: ChatId,
    ) -> Result<Vec<RoutingRule>> {
        let key = (task_id, source_chat_id);
        if let Some(hit) = self.get(&self.rules, &key) {
            return Ok(hit);
        }
        let rules = self.inner.list_matching_rules(task_id, source_chat_id).await?;
        self.put(&self.rules, key, rules.clone());
        Ok(rules)
    }
}
