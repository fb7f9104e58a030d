//! Records held by the configuration store.

use {
    ferry_common::{ChatId, ConnectionKind, ForwardMode, ResourceId, RuleId, TaskId},
    serde::{Deserialize, Serialize},
};

pub type TenantId = i64;

/// Account that owns resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub telegram_user_id: i64,
    pub language_code: Option<String>,
    pub timezone: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
}

/// A gateway bot or user session registered by a tenant.
///
/// The encrypted credential is deliberately absent; read it with
/// [`ConfigStore::get_resource_secret`](crate::ConfigStore::get_resource_secret).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub tenant_id: TenantId,
    pub kind: ConnectionKind,
    pub label: Option<String>,
    pub is_active: bool,
    pub has_secret: bool,
    pub created_at: i64,
}

/// A named routing task bound to one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingTask {
    pub id: TaskId,
    pub resource_id: ResourceId,
    pub name: String,
    pub kind: ConnectionKind,
    pub is_active: bool,
    /// Free-form task settings, stored as JSON.
    pub config: serde_json::Value,
    pub created_at: i64,
}

/// Active task id together with its kind, as returned to the routing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveTask {
    pub id: TaskId,
    pub kind: ConnectionKind,
}

/// Source chat to destination chat mapping inside a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: RuleId,
    pub task_id: TaskId,
    pub source_chat_id: ChatId,
    pub destination_chat_id: ChatId,
    pub forward_mode: ForwardMode,
    /// Reserved filter document. Stored and returned but not evaluated yet.
    pub filters: serde_json::Value,
}

impl RoutingRule {
    /// Whether the rule's filters let a message through.
    ///
    /// Filters are not evaluated yet, so every rule whose source matches
    /// delivers.
    #[must_use]
    pub fn filters_pass(&self) -> bool {
        true
    }
}
