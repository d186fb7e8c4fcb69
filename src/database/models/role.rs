use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant-scoped role. Names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Canonical stored form of a role name.
pub fn canonical_role_name(name: &str) -> String {
    name.trim().to_lowercase()
}
