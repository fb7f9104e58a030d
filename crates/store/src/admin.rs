//! Admin operations on [`SqliteConfigStore`]: tenant, resource, task and
//! rule management used by the operator CLI.

use {
    ferry_common::{ChatId, ConnectionKind, ForwardMode, ResourceId, RuleId, TaskId},
    ferry_vault::Vault,
    secrecy::{ExposeSecret, Secret},
    tracing::info,
};

use crate::{
    Error, Result,
    error::Context,
    model::{Resource, RoutingRule, RoutingTask, Tenant, TenantId},
    sqlite::{
        RESOURCE_COLUMNS, RULE_COLUMNS, ResourceRow, RuleRow, SqliteConfigStore, TASK_COLUMNS,
        TaskRow, TenantRow, now,
    },
};

/// A resource to register. The secret is encrypted before it is written.
pub struct NewResource {
    pub tenant_id: TenantId,
    pub kind: ConnectionKind,
    pub label: Option<String>,
    pub secret: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub resource_id: ResourceId,
    pub name: String,
    /// Defaults to the resource's kind.
    pub kind: Option<ConnectionKind>,
    pub config: serde_json::Value,
}

impl NewTask {
    #[must_use]
    pub fn new(resource_id: ResourceId, name: impl Into<String>) -> Self {
        Self {
            resource_id,
            name: name.into(),
            kind: None,
            config: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRule {
    pub task_id: TaskId,
    pub source_chat_id: ChatId,
    pub destination_chat_id: ChatId,
    pub forward_mode: ForwardMode,
    pub filters: serde_json::Value,
}

impl NewRule {
    #[must_use]
    pub fn new(
        task_id: TaskId,
        source_chat_id: ChatId,
        destination_chat_id: ChatId,
        forward_mode: ForwardMode,
    ) -> Self {
        Self {
            task_id,
            source_chat_id,
            destination_chat_id,
            forward_mode,
            filters: serde_json::json!({}),
        }
    }
}

impl SqliteConfigStore {
    // ── Tenants ─────────────────────────────────────────────────────────────

    /// Return the tenant for a Telegram user id, creating it on first use.
    pub async fn get_or_create_tenant(&self, telegram_user_id: i64) -> Result<Tenant> {
        let ts = now();
        sqlx::query(
            r#"INSERT INTO tenants (telegram_user_id, is_active, created_at, updated_at)
               VALUES (?, 1, ?, ?)
               ON CONFLICT(telegram_user_id) DO NOTHING"#,
        )
        .bind(telegram_user_id)
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, TenantRow>(
            "SELECT id, telegram_user_id, language_code, timezone, is_active, created_at \
             FROM tenants WHERE telegram_user_id = ?",
        )
        .bind(telegram_user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    /// Update display preferences. `None` leaves a field unchanged.
    pub async fn update_tenant_preferences(
        &self,
        tenant_id: TenantId,
        language_code: Option<&str>,
        timezone: Option<&str>,
    ) -> Result<Tenant> {
        sqlx::query(
            r#"UPDATE tenants SET
                 language_code = COALESCE(?, language_code),
                 timezone = COALESCE(?, timezone),
                 updated_at = ?
               WHERE id = ?"#,
        )
        .bind(language_code)
        .bind(timezone)
        .bind(now())
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        self.fetch_tenant(tenant_id)
            .await?
            .ok_or_else(|| Error::not_found("tenant", tenant_id))
    }

    // ── Resources ───────────────────────────────────────────────────────────

    pub async fn create_resource(&self, vault: &Vault, new: NewResource) -> Result<Resource> {
        self.fetch_tenant(new.tenant_id)
            .await?
            .ok_or_else(|| Error::not_found("tenant", new.tenant_id))?;

        let blob = vault.encrypt(new.secret.expose_secret())?;
        let ts = now();
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO resources (tenant_id, kind, label, secret_encrypted, is_active, created_at, updated_at)
               VALUES (?, ?, ?, ?, 1, ?, ?)
               RETURNING id"#,
        )
        .bind(new.tenant_id)
        .bind(new.kind.as_str())
        .bind(new.label.as_deref())
        .bind(&blob)
        .bind(ts)
        .bind(ts)
        .fetch_one(&self.pool)
        .await?;

        info!(resource_id = id, kind = %new.kind, tenant_id = new.tenant_id, "resource created");
        self.get_resource(id)
            .await?
            .context("resource vanished after insert")
    }

    pub async fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?");
        let row = sqlx::query_as::<_, ResourceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// All resources, or only those of one tenant. Newest first.
    pub async fn list_resources(&self, tenant_id: Option<TenantId>) -> Result<Vec<Resource>> {
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources \
             WHERE (? IS NULL OR tenant_id = ?) ORDER BY id DESC"
        );
        let rows = sqlx::query_as::<_, ResourceRow>(&sql)
            .bind(tenant_id)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn set_resource_active(&self, id: ResourceId, active: bool) -> Result<Resource> {
        let done = sqlx::query("UPDATE resources SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("resource", id));
        }
        info!(resource_id = id, active, "resource toggled");
        self.get_resource(id)
            .await?
            .ok_or_else(|| Error::not_found("resource", id))
    }

    /// Delete a resource together with its tasks and rules.
    pub async fn delete_resource(&self, id: ResourceId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM resources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    // ── Tasks ───────────────────────────────────────────────────────────────

    /// Create a task on a resource.
    ///
    /// The task kind must equal the resource kind; an explicit mismatching
    /// kind is rejected with [`Error::KindMismatch`].
    pub async fn create_task(&self, new: NewTask) -> Result<RoutingTask> {
        let resource = self
            .get_resource(new.resource_id)
            .await?
            .ok_or_else(|| Error::not_found("resource", new.resource_id))?;
        let kind = new.kind.unwrap_or(resource.kind);
        if kind != resource.kind {
            return Err(Error::KindMismatch {
                task: kind,
                resource: resource.kind,
            });
        }

        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::Message("task name must not be empty".into()));
        }

        let config = serde_json::to_string(&new.config)?;
        let ts = now();
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO tasks (resource_id, name, kind, is_active, config, created_at, updated_at)
               VALUES (?, ?, ?, 1, ?, ?, ?)
               RETURNING id"#,
        )
        .bind(new.resource_id)
        .bind(name)
        .bind(kind.as_str())
        .bind(&config)
        .bind(ts)
        .bind(ts)
        .fetch_one(&self.pool)
        .await?;

        info!(task_id = id, resource_id = new.resource_id, %kind, "task created");
        self.get_task(id).await?.context("task vanished after insert")
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Option<RoutingTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Tasks of one resource, newest first.
    pub async fn list_tasks(&self, resource_id: ResourceId) -> Result<Vec<RoutingTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE resource_id = ? ORDER BY id DESC");
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn rename_task(&self, id: TaskId, name: &str) -> Result<RoutingTask> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Message("task name must not be empty".into()));
        }
        let done = sqlx::query("UPDATE tasks SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("task", id));
        }
        self.get_task(id)
            .await?
            .ok_or_else(|| Error::not_found("task", id))
    }

    pub async fn set_task_active(&self, id: TaskId, active: bool) -> Result<RoutingTask> {
        let done = sqlx::query("UPDATE tasks SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("task", id));
        }
        info!(task_id = id, active, "task toggled");
        self.get_task(id)
            .await?
            .ok_or_else(|| Error::not_found("task", id))
    }

    /// Delete a task together with its rules.
    pub async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    // ── Rules ───────────────────────────────────────────────────────────────

    pub async fn add_rule(&self, new: NewRule) -> Result<RoutingRule> {
        self.get_task(new.task_id)
            .await?
            .ok_or_else(|| Error::not_found("task", new.task_id))?;

        let filters = serde_json::to_string(&new.filters)?;
        let ts = now();
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO routing_rules
                 (task_id, source_chat_id, destination_chat_id, forward_mode, filters, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               RETURNING id"#,
        )
        .bind(new.task_id)
        .bind(new.source_chat_id)
        .bind(new.destination_chat_id)
        .bind(new.forward_mode.as_str())
        .bind(&filters)
        .bind(ts)
        .bind(ts)
        .fetch_one(&self.pool)
        .await?;

        info!(
            rule_id = id,
            task_id = new.task_id,
            source = new.source_chat_id,
            destination = new.destination_chat_id,
            mode = %new.forward_mode,
            "routing rule added"
        );
        Ok(RoutingRule {
            id,
            task_id: new.task_id,
            source_chat_id: new.source_chat_id,
            destination_chat_id: new.destination_chat_id,
            forward_mode: new.forward_mode,
            filters: new.filters,
        })
    }

    pub async fn list_rules(&self, task_id: TaskId) -> Result<Vec<RoutingRule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM routing_rules WHERE task_id = ? ORDER BY id");
        let rows = sqlx::query_as::<_, RuleRow>(&sql)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn delete_rule(&self, id: RuleId) -> Result<bool> {
        let done = sqlx::query("DELETE FROM routing_rules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}
