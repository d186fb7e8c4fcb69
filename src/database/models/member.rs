use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::query_builder::ListColumns;

/// A user as seen from inside one tenant: identity fields joined with the
/// membership row and its role names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TenantMember {
    /// `tenant_users.id`; the handle used by `/v1/users/:id`.
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything persisted by admin user creation, in one transaction.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub role_id: Option<Uuid>,
}

/// `role_id: Some` replaces the member's role set with that single role.
#[derive(Debug, Clone, Default)]
pub struct MemberChanges {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub role_id: Option<Uuid>,
}

pub const MEMBER_COLUMNS: ListColumns = ListColumns {
    search: &["u.username", "u.email", "u.full_name"],
    sort: &[
        ("username", "u.username"),
        ("email", "u.email"),
        ("full_name", "u.full_name"),
        ("created_at", "tu.created_at"),
    ],
    default_sort: "tu.created_at",
    id_column: "tu.id",
};
