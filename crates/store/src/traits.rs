use {
    async_trait::async_trait,
    ferry_common::{ChatId, ConnectionKey, ConnectionKind, TaskId},
};

use crate::{
    Result,
    model::{ActiveTask, Resource, RoutingRule},
};

/// Read-only query surface the routing core depends on.
///
/// Implementations must be safe to call concurrently from every connection
/// worker.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Active resources of one kind, ordered by id.
    async fn list_active_resources_by_kind(&self, kind: ConnectionKind) -> Result<Vec<Resource>>;

    /// Encrypted credential of a resource, `None` when the resource does not
    /// exist or has no credential stored.
    async fn get_resource_secret(&self, key: ConnectionKey) -> Result<Option<String>>;

    /// Active tasks bound to the resource identified by `key`.
    ///
    /// Only tasks whose kind equals `key.kind` (and whose resource has that
    /// kind) are returned, so a bot task never runs on a user session and
    /// vice versa.
    async fn list_active_tasks(&self, key: ConnectionKey) -> Result<Vec<ActiveTask>>;

    /// Rules of `task_id` whose source is `source_chat_id`.
    async fn list_matching_rules(
        &self,
        task_id: TaskId,
        source_chat_id: ChatId,
    ) -> Result<Vec<RoutingRule>>;
}
