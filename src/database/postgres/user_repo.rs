use async_trait::async_trait;
use uuid::Uuid;

use super::{logged, require_affected};
use crate::database::manager::{Database, DbError};
use crate::database::models::{NewUser, User};
use crate::database::repository::UserRepository;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, phone, is_active, created_at, updated_at";

/// Users are global: no tenant is activated for these statements.
pub struct PgUserRepository {
    db: Database,
}

impl PgUserRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, input: &NewUser) -> Result<User, DbError> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, full_name, phone, is_active) \
             VALUES ($1, $2, $3, $4, $5, true) RETURNING {}",
            USER_COLUMNS
        );
        let result = sqlx::query_as::<_, User>(&sql)
            .bind(&input.username)
            .bind(&input.email)
            .bind(&input.password_hash)
            .bind(&input.full_name)
            .bind(&input.phone)
            .fetch_one(self.db.write())
            .await
            .map_err(DbError::from);
        logged("users.create", result)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, DbError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let result = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.db.read())
            .await
            .map_err(DbError::from)
            .and_then(|row| row.ok_or(DbError::NotFound("user")));
        logged("users.get_by_id", result)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let sql = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
        let result = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(self.db.read())
            .await
            .map_err(DbError::from);
        logged("users.find_by_email", result)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let sql = format!("SELECT {} FROM users WHERE lower(username) = lower($1)", USER_COLUMNS);
        let result = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(self.db.read())
            .await
            .map_err(DbError::from);
        logged("users.find_by_username", result)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(self.db.write())
            .await
            .map_err(DbError::from)
            .and_then(|done| require_affected(done.rows_affected(), "user"));
        logged("users.update_password", result)
    }
}
