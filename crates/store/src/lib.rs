//! Configuration store: tenants, tenant resources, routing tasks and rules.
//!
//! The routing core only consumes the read-only [`ConfigStore`] query
//! surface. [`SqliteConfigStore`] implements it on SQLite and additionally
//! carries the admin operations the operator tooling uses to manage records.

pub mod admin;
pub mod error;
pub mod model;
pub mod sqlite;
pub mod traits;

pub use {
    admin::{NewResource, NewRule, NewTask},
    error::{Error, Result},
    model::{ActiveTask, Resource, RoutingRule, RoutingTask, Tenant, TenantId},
    sqlite::SqliteConfigStore,
    traits::ConfigStore,
};

/// Run database migrations for the store.
///
/// Creates the tenants, resources, tasks and routing_rules tables. Call once
/// at startup before constructing a [`SqliteConfigStore`] on a bare pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
