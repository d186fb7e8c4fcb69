use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Root of isolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub domain: Option<String>,
    pub plan_id: Option<Uuid>,
    pub subscription_status: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
}

/// Junction binding a global user into one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TenantUser {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A membership with its tenant loaded, as listed by `GET /v1/auth/tenants`.
#[derive(Debug, Clone, Serialize)]
pub struct UserTenant {
    #[serde(flatten)]
    pub membership: TenantUser,
    pub tenant: Tenant,
}
