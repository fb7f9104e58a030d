use {
    async_trait::async_trait,
    ferry_common::{ChatId, ConnectionKey, ConnectionKind, TaskId},
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::{debug, info},
};

use crate::{
    Result,
    model::{ActiveTask, Resource, RoutingRule, RoutingTask, Tenant},
    run_migrations,
    traits::ConfigStore,
};

#[derive(sqlx::FromRow)]
pub(crate) struct TenantRow {
    id: i64,
    telegram_user_id: i64,
    language_code: Option<String>,
    timezone: Option<String>,
    is_active: bool,
    created_at: i64,
}

impl From<TenantRow> for Tenant {
    fn from(r: TenantRow) -> Self {
        Self {
            id: r.id,
            telegram_user_id: r.telegram_user_id,
            language_code: r.language_code,
            timezone: r.timezone,
            is_active: r.is_active,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ResourceRow {
    id: i64,
    tenant_id: i64,
    kind: String,
    label: Option<String>,
    is_active: bool,
    has_secret: bool,
    created_at: i64,
}

impl TryFrom<ResourceRow> for Resource {
    type Error = crate::Error;

    fn try_from(r: ResourceRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            tenant_id: r.tenant_id,
            kind: r.kind.parse()?,
            label: r.label,
            is_active: r.is_active,
            has_secret: r.has_secret,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TaskRow {
    id: i64,
    resource_id: i64,
    name: String,
    kind: String,
    is_active: bool,
    config: String,
    created_at: i64,
}

impl TryFrom<TaskRow> for RoutingTask {
    type Error = crate::Error;

    fn try_from(r: TaskRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            resource_id: r.resource_id,
            name: r.name,
            kind: r.kind.parse()?,
            is_active: r.is_active,
            config: serde_json::from_str(&r.config)?,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RuleRow {
    id: i64,
    task_id: i64,
    source_chat_id: i64,
    destination_chat_id: i64,
    forward_mode: String,
    filters: String,
}

impl TryFrom<RuleRow> for RoutingRule {
    type Error = crate::Error;

    fn try_from(r: RuleRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            task_id: r.task_id,
            source_chat_id: r.source_chat_id,
            destination_chat_id: r.destination_chat_id,
            forward_mode: r.forward_mode.parse()?,
            filters: serde_json::from_str(&r.filters)?,
        })
    }
}

pub(crate) const RESOURCE_COLUMNS: &str = "id, tenant_id, kind, label, is_active, \
     (secret_encrypted IS NOT NULL AND secret_encrypted <> '') AS has_secret, created_at";

pub(crate) const TASK_COLUMNS: &str =
    "id, resource_id, name, kind, is_active, config, created_at";

pub(crate) const RULE_COLUMNS: &str =
    "id, task_id, source_chat_id, destination_chat_id, forward_mode, filters";

pub(crate) fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// SQLite-backed configuration store.
#[derive(Clone)]
pub struct SqliteConfigStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool from `[database]` settings and apply migrations.
    pub async fn connect(config: &ferry_config::DatabaseConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(&config.url)
            .await?;
        run_migrations(&pool).await?;
        info!(url = %config.url, "configuration store ready");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) async fn fetch_tenant(&self, id: i64) -> Result<Option<Tenant>> {
        let row = sqlx::query_as::<_, TenantRow>(
            "SELECT id, telegram_user_id, language_code, timezone, is_active, created_at \
             FROM tenants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn list_active_resources_by_kind(&self, kind: ConnectionKind) -> Result<Vec<Resource>> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE kind = ? AND is_active = 1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, ResourceRow>(&sql)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_resource_secret(&self, key: ConnectionKey) -> Result<Option<String>> {
        let secret: Option<Option<String>> = sqlx::query_scalar(
            "SELECT secret_encrypted FROM resources WHERE id = ? AND kind = ?",
        )
        .bind(key.resource_id)
        .bind(key.kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(secret.flatten().filter(|s| !s.is_empty()))
    }

    async fn list_active_tasks(&self, key: ConnectionKey) -> Result<Vec<ActiveTask>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"SELECT t.id FROM tasks t
               JOIN resources r ON r.id = t.resource_id
               WHERE t.resource_id = ?
                 AND r.kind = ?
                 AND t.kind = ?
                 AND t.is_active = 1
                 AND r.is_active = 1
               ORDER BY t.id"#,
        )
        .bind(key.resource_id)
        .bind(key.kind.as_str())
        .bind(key.kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        debug!(%key, tasks = ids.len(), "listed active tasks");
        Ok(ids
            .into_iter()
            .map(|id| ActiveTask { id, kind: key.kind })
            .collect())
    }

    async fn list_matching_rules(
        &self,
        task_id: TaskId,
        source_chat_id: ChatId,
    ) -> Result<Vec<RoutingRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM routing_rules \
             WHERE task_id = ? AND source_chat_id = ? ORDER BY id"
        );
        let rows = sqlx::query_as::<_, RuleRow>(&sql)
            .bind(task_id)
            .bind(source_chat_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
