//! Projects the active tenant into the Postgres session so row-level
//! security policies filter every statement on that connection.

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{Executor, PgConnection, Postgres};
use tracing::{debug, warn};
use uuid::Uuid;

use super::manager::{Access, Database, DbError};

/// Session variable consulted by the RLS policies in `sql/schema.sql`.
pub const TENANT_SETTING: &str = "app.current_tenant";

/// `set_config` is parameterized; the tenant id never lands in SQL text.
pub async fn set_tenant<'e, E>(executor: E, tenant_id: Uuid, local: bool) -> Result<(), DbError>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("SELECT set_config($1, $2, $3)")
        .bind(TENANT_SETTING)
        .bind(tenant_id.to_string())
        .bind(local)
        .execute(executor)
        .await
        .map_err(|e| DbError::TenantContext(e.to_string()))?;
    Ok(())
}

/// Reset to the empty string; the policies treat it as "no tenant".
pub async fn clear_tenant<'e, E>(executor: E, local: bool) -> Result<(), DbError>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("SELECT set_config($1, '', $2)")
        .bind(TENANT_SETTING)
        .bind(local)
        .execute(executor)
        .await
        .map_err(|e| DbError::TenantContext(e.to_string()))?;
    Ok(())
}

pub async fn current_tenant<'e, E>(executor: E) -> Result<Option<Uuid>, DbError>
where
    E: Executor<'e, Database = Postgres>,
{
    let (value,): (Option<String>,) = sqlx::query_as("SELECT current_setting($1, true)")
        .bind(TENANT_SETTING)
        .fetch_one(executor)
        .await?;

    match value {
        Some(raw) if !raw.is_empty() => Uuid::parse_str(&raw)
            .map(Some)
            .map_err(|e| DbError::TenantContext(e.to_string())),
        _ => Ok(None),
    }
}

/// Request-level tenant hook run by tenant resolution.
#[async_trait]
pub trait TenantContext: Send + Sync {
    async fn set(&self, tenant_id: Uuid) -> Result<(), DbError>;
    async fn clear(&self) -> Result<(), DbError>;
}

/// Session-level set/clear on both pools, once when they share a handle.
///
/// Isolation for repository statements comes from [`Database::within`],
/// which re-asserts the tenant inside its own transaction.
#[derive(Clone)]
pub struct PgTenantContext {
    db: Database,
}

impl PgTenantContext {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantContext for PgTenantContext {
    async fn set(&self, tenant_id: Uuid) -> Result<(), DbError> {
        set_tenant(self.db.write(), tenant_id, false).await?;
        if !self.db.is_shared() {
            set_tenant(self.db.read(), tenant_id, false).await?;
        }
        debug!(%tenant_id, "tenant context set");
        Ok(())
    }

    async fn clear(&self) -> Result<(), DbError> {
        clear_tenant(self.db.write(), false).await?;
        if !self.db.is_shared() {
            clear_tenant(self.db.read(), false).await?;
        }
        Ok(())
    }
}

impl Database {
    /// Run `f` on one pinned connection with `tenant_id` active.
    ///
    /// The work runs in a transaction and the setting is transaction-local,
    /// so commit and rollback both clear it; a pooled connection never carries
    /// a tenant into the next borrower. `f` sees either all of its writes
    /// committed or none.
    pub async fn within<T, F>(&self, tenant_id: Uuid, access: Access, f: F) -> Result<T, DbError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, DbError>> + Send,
    {
        let mut tx = self.pool(access).begin().await?;
        set_tenant(&mut *tx, tenant_id, true).await?;

        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(%tenant_id, error = %rollback, "rollback failed; connection dropped");
                }
                Err(err)
            }
        }
    }
}
