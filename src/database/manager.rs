use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::{PgConfig, PgNodeConfig};

/// Errors from the relational store adapter
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Tenant context error: {0}")]
    TenantContext(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl DbError {
    /// Missing rows and constraint violations are expected outcomes, not outages.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(
            self,
            DbError::NotFound(_) | DbError::Conflict(_) | DbError::InvalidReference(_)
        )
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let classified = match &err {
            sqlx::Error::RowNotFound => Some(DbError::NotFound("record")),
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                match db_err.code().as_deref() {
                    Some("23505") => Some(DbError::Conflict(format!(
                        "unique constraint {} violated",
                        constraint
                    ))),
                    Some("23503") => Some(DbError::InvalidReference(format!(
                        "foreign key {} violated",
                        constraint
                    ))),
                    _ => None,
                }
            }
            _ => None,
        };

        match classified {
            Some(classified) => classified,
            None => DbError::Sqlx(err),
        }
    }
}

/// Which pool a statement goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Read/write connection pair. When both sides are configured identically a
/// single pool backs both and `shared` is set.
#[derive(Clone, Debug)]
pub struct Database {
    read: PgPool,
    write: PgPool,
    shared: bool,
}

impl Database {
    pub async fn connect(config: &PgConfig) -> Result<Self, DbError> {
        let write = Self::open_pool(&config.write).await?;
        info!(host = %config.write.host, database = %config.write.name, "Created write pool");

        if config.read == config.write {
            return Ok(Self::shared(write));
        }

        let read = Self::open_pool(&config.read).await?;
        info!(host = %config.read.host, database = %config.read.name, "Created read pool");
        Ok(Self {
            read,
            write,
            shared: false,
        })
    }

    pub fn shared(pool: PgPool) -> Self {
        Self {
            read: pool.clone(),
            write: pool,
            shared: true,
        }
    }

    pub fn read(&self) -> &PgPool {
        &self.read
    }

    pub fn write(&self) -> &PgPool {
        &self.write
    }

    pub fn pool(&self, access: Access) -> &PgPool {
        match access {
            Access::Read => &self.read,
            Access::Write => &self.write,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    async fn open_pool(node: &PgNodeConfig) -> Result<PgPool, DbError> {
        let connection_string = Self::build_connection_string(node)?;
        let lifetime = match node.max_connection_lifetime {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let pool = PgPoolOptions::new()
            .max_connections(node.max_open_connection.max(1))
            .min_connections(node.max_idle_connection.min(node.max_open_connection))
            .max_lifetime(lifetime)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&connection_string)
            .await?;
        Ok(pool)
    }

    pub fn build_connection_string(node: &PgNodeConfig) -> Result<String, DbError> {
        let invalid = |what: &str| DbError::InvalidDatabaseUrl(format!("{} for {}", what, node.host));

        let mut url = url::Url::parse("postgres://localhost")
            .map_err(|e| DbError::InvalidDatabaseUrl(e.to_string()))?;
        url.set_host(Some(&node.host))
            .map_err(|e| DbError::InvalidDatabaseUrl(e.to_string()))?;
        url.set_port(Some(node.port)).map_err(|_| invalid("port"))?;
        url.set_username(&node.user).map_err(|_| invalid("user"))?;
        if !node.password.is_empty() {
            url.set_password(Some(&node.password))
                .map_err(|_| invalid("password"))?;
        }
        url.set_path(&format!("/{}", node.name));
        if !node.sslmode.is_empty() {
            url.query_pairs_mut().append_pair("sslmode", &node.sslmode);
        }
        Ok(url.into())
    }

    /// Pings both pools (once when shared)
    pub async fn health_check(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1").execute(&self.write).await?;
        if !self.shared {
            sqlx::query("SELECT 1").execute(&self.read).await?;
        }
        Ok(())
    }

    /// Close pools on shutdown
    pub async fn close(&self) {
        self.write.close().await;
        if !self.shared {
            self.read.close().await;
        }
        info!("Closed database pools");
    }
}

/// Liveness check used by `/v1/health`.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), DbError>;
}

#[async_trait]
impl StoreHealth for Database {
    async fn ping(&self) -> Result<(), DbError> {
        self.health_check().await
    }
}
