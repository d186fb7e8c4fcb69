use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use super::logged;
use crate::database::manager::{Access, Database, DbError};
use crate::database::models::{
    MemberChanges, NewMember, Role, Tenant, TenantMember, TenantUser, UserTenant, MEMBER_COLUMNS,
};
use crate::database::query_builder::{push_order_and_page, push_tenant_filter, ListQuery};
use crate::database::repository::{CrudRepository, MembershipRepository};

const MEMBER_SELECT: &str = "SELECT tu.id, tu.tenant_id, tu.user_id, u.username, u.email, u.full_name, \
     u.phone, tu.is_active, \
     ARRAY(SELECT r.name FROM tenant_user_roles tur JOIN roles r ON r.id = tur.role_id \
           WHERE tur.tenant_user_id = tu.id ORDER BY r.name) AS roles, \
     tu.created_at \
     FROM tenant_users tu JOIN users u ON u.id = tu.user_id";

const MEMBER_COUNT: &str = "SELECT COUNT(*) FROM tenant_users tu JOIN users u ON u.id = tu.user_id";

const MEMBERSHIP_COLUMNS: &str = "id, tenant_id, user_id, is_active, created_at";

#[derive(FromRow)]
struct UserTenantRow {
    id: Uuid,
    tenant_id: Uuid,
    user_id: Uuid,
    is_active: bool,
    created_at: DateTime<Utc>,
    tenant_name: String,
    tenant_domain: Option<String>,
    tenant_plan_id: Option<Uuid>,
    tenant_subscription_status: String,
    tenant_created_at: DateTime<Utc>,
    tenant_created_by: Option<Uuid>,
}

impl From<UserTenantRow> for UserTenant {
    fn from(row: UserTenantRow) -> Self {
        UserTenant {
            membership: TenantUser {
                id: row.id,
                tenant_id: row.tenant_id,
                user_id: row.user_id,
                is_active: row.is_active,
                created_at: row.created_at,
            },
            tenant: Tenant {
                id: row.tenant_id,
                name: row.tenant_name,
                domain: row.tenant_domain,
                plan_id: row.tenant_plan_id,
                subscription_status: row.tenant_subscription_status,
                created_at: row.tenant_created_at,
                created_by: row.tenant_created_by,
            },
        }
    }
}

/// Memberships joined with users and roles. Writes touching several tables
/// run inside one `within` transaction.
pub struct PgMembershipRepository {
    db: Database,
}

impl PgMembershipRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

async fn fetch_member(conn: &mut PgConnection, tenant_id: Uuid, id: Uuid) -> Result<TenantMember, DbError> {
    let sql = format!("{} WHERE tu.tenant_id = $1 AND tu.id = $2", MEMBER_SELECT);
    sqlx::query_as::<_, TenantMember>(&sql)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(DbError::NotFound("user"))
}

/// Attach `role_id` to a membership, refusing roles of other tenants.
async fn assign_role(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    tenant_user_id: Uuid,
    role_id: Uuid,
) -> Result<(), DbError> {
    let done = sqlx::query(
        "INSERT INTO tenant_user_roles (tenant_user_id, role_id) \
         SELECT $1, r.id FROM roles r WHERE r.id = $2 AND r.tenant_id = $3",
    )
    .bind(tenant_user_id)
    .bind(role_id)
    .bind(tenant_id)
    .execute(conn)
    .await?;

    if done.rows_affected() == 0 {
        return Err(DbError::InvalidReference(format!("role {} not found in tenant", role_id)));
    }
    Ok(())
}

/// Junction row plus optional role; the caller owns the transaction.
async fn insert_membership(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    user_id: Uuid,
    is_active: bool,
    role_id: Option<Uuid>,
) -> Result<TenantMember, DbError> {
    let (tenant_user_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO tenant_users (tenant_id, user_id, is_active) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(tenant_id)
    .bind(user_id)
    .bind(is_active)
    .fetch_one(&mut *conn)
    .await?;

    if let Some(role_id) = role_id {
        assign_role(&mut *conn, tenant_id, tenant_user_id, role_id).await?;
    }

    fetch_member(conn, tenant_id, tenant_user_id).await
}

/// Remove users left without any membership.
async fn delete_orphans(conn: &mut PgConnection, user_ids: Vec<Uuid>) -> Result<u64, DbError> {
    let done = sqlx::query(
        "DELETE FROM users u WHERE u.id = ANY($1) \
         AND NOT EXISTS (SELECT 1 FROM tenant_users tu WHERE tu.user_id = u.id)",
    )
    .bind(user_ids)
    .execute(conn)
    .await?;
    Ok(done.rows_affected())
}

#[async_trait]
impl CrudRepository<TenantMember, NewMember, MemberChanges> for PgMembershipRepository {
    async fn create(&self, tenant_id: Uuid, input: &NewMember) -> Result<TenantMember, DbError> {
        let input = input.clone();
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    let (user_id,): (Uuid,) = sqlx::query_as(
                        "INSERT INTO users (username, email, password_hash, full_name, phone, is_active) \
                         VALUES ($1, $2, $3, $4, $5, true) RETURNING id",
                    )
                    .bind(&input.username)
                    .bind(&input.email)
                    .bind(&input.password_hash)
                    .bind(&input.full_name)
                    .bind(&input.phone)
                    .fetch_one(&mut *conn)
                    .await?;

                    insert_membership(&mut *conn, tenant_id, user_id, input.is_active, input.role_id).await
                })
            })
            .await;
        logged("members.create", result)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<TenantMember, DbError> {
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move { fetch_member(conn, tenant_id, id).await })
            })
            .await;
        logged("members.get_by_id", result)
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, changes: &MemberChanges) -> Result<TenantMember, DbError> {
        let changes = changes.clone();
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    let (user_id,): (Uuid,) =
                        sqlx::query_as("SELECT user_id FROM tenant_users WHERE tenant_id = $1 AND id = $2")
                            .bind(tenant_id)
                            .bind(id)
                            .fetch_optional(&mut *conn)
                            .await?
                            .ok_or(DbError::NotFound("user"))?;

                    if changes.full_name.is_some() || changes.phone.is_some() {
                        sqlx::query(
                            "UPDATE users SET full_name = COALESCE($2, full_name), \
                             phone = COALESCE($3, phone), updated_at = now() WHERE id = $1",
                        )
                        .bind(user_id)
                        .bind(&changes.full_name)
                        .bind(&changes.phone)
                        .execute(&mut *conn)
                        .await?;
                    }

                    if let Some(is_active) = changes.is_active {
                        sqlx::query("UPDATE tenant_users SET is_active = $3 WHERE tenant_id = $1 AND id = $2")
                            .bind(tenant_id)
                            .bind(id)
                            .bind(is_active)
                            .execute(&mut *conn)
                            .await?;
                    }

                    if let Some(role_id) = changes.role_id {
                        sqlx::query("DELETE FROM tenant_user_roles WHERE tenant_user_id = $1")
                            .bind(id)
                            .execute(&mut *conn)
                            .await?;
                        assign_role(&mut *conn, tenant_id, id, role_id).await?;
                    }

                    fetch_member(&mut *conn, tenant_id, id).await
                })
            })
            .await;
        logged("members.update", result)
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    let (user_id,): (Uuid,) = sqlx::query_as(
                        "DELETE FROM tenant_users WHERE tenant_id = $1 AND id = $2 RETURNING user_id",
                    )
                    .bind(tenant_id)
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(DbError::NotFound("user"))?;

                    delete_orphans(&mut *conn, vec![user_id]).await?;
                    Ok::<_, DbError>(())
                })
            })
            .await;
        logged("members.delete", result)
    }

    async fn list(&self, tenant_id: Uuid, query: &ListQuery) -> Result<(Vec<TenantMember>, i64), DbError> {
        let query = query.clone();
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let search = query.search.as_deref();

                    let mut count = QueryBuilder::<Postgres>::new(MEMBER_COUNT);
                    push_tenant_filter(&mut count, "tu.tenant_id", tenant_id, &MEMBER_COLUMNS, search);
                    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

                    let mut select = QueryBuilder::<Postgres>::new(MEMBER_SELECT);
                    push_tenant_filter(&mut select, "tu.tenant_id", tenant_id, &MEMBER_COLUMNS, search);
                    push_order_and_page(&mut select, &MEMBER_COLUMNS, &query);
                    let items = select
                        .build_query_as::<TenantMember>()
                        .fetch_all(&mut *conn)
                        .await?;

                    Ok::<_, DbError>((items, total))
                })
            })
            .await;
        logged("members.list", result)
    }

    async fn existing_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Uuid>, DbError> {
        let ids = ids.to_vec();
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let found: Vec<Uuid> =
                        sqlx::query_scalar("SELECT id FROM tenant_users WHERE tenant_id = $1 AND id = ANY($2)")
                            .bind(tenant_id)
                            .bind(ids)
                            .fetch_all(&mut *conn)
                            .await?;
                    Ok::<_, DbError>(found)
                })
            })
            .await;
        logged("members.existing_ids", result)
    }

    async fn bulk_delete(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<u64, DbError> {
        let ids = ids.to_vec();
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    let user_ids: Vec<Uuid> = sqlx::query_scalar(
                        "DELETE FROM tenant_users WHERE tenant_id = $1 AND id = ANY($2) RETURNING user_id",
                    )
                    .bind(tenant_id)
                    .bind(ids)
                    .fetch_all(&mut *conn)
                    .await?;

                    let deleted = user_ids.len() as u64;
                    delete_orphans(&mut *conn, user_ids).await?;
                    Ok::<_, DbError>(deleted)
                })
            })
            .await;
        logged("members.bulk_delete", result)
    }
}

#[async_trait]
impl MembershipRepository for PgMembershipRepository {
    async fn list_user_tenants(&self, user_id: Uuid) -> Result<Vec<UserTenant>, DbError> {
        let result = sqlx::query_as::<_, UserTenantRow>(
            "SELECT tu.id, tu.tenant_id, tu.user_id, tu.is_active, tu.created_at, \
             t.name AS tenant_name, t.domain AS tenant_domain, t.plan_id AS tenant_plan_id, \
             t.subscription_status AS tenant_subscription_status, \
             t.created_at AS tenant_created_at, t.created_by AS tenant_created_by \
             FROM tenant_users tu JOIN tenants t ON t.id = tu.tenant_id \
             WHERE tu.user_id = $1 AND tu.is_active ORDER BY t.name",
        )
        .bind(user_id)
        .fetch_all(self.db.read())
        .await
        .map(|rows| rows.into_iter().map(UserTenant::from).collect())
        .map_err(DbError::from);
        logged("members.list_user_tenants", result)
    }

    async fn link_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        is_active: bool,
        role_id: Option<Uuid>,
    ) -> Result<TenantMember, DbError> {
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move { insert_membership(conn, tenant_id, user_id, is_active, role_id).await })
            })
            .await;
        logged("members.link_user", result)
    }

    async fn find_membership(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Option<TenantUser>, DbError> {
        let sql = format!(
            "SELECT {} FROM tenant_users WHERE tenant_id = $1 AND user_id = $2",
            MEMBERSHIP_COLUMNS
        );
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let row = sqlx::query_as::<_, TenantUser>(&sql)
                        .bind(tenant_id)
                        .bind(user_id)
                        .fetch_optional(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(row)
                })
            })
            .await;
        logged("members.find_membership", result)
    }

    async fn find_membership_by_id(
        &self,
        tenant_id: Uuid,
        tenant_user_id: Uuid,
    ) -> Result<Option<TenantUser>, DbError> {
        let sql = format!("SELECT {} FROM tenant_users WHERE tenant_id = $1 AND id = $2", MEMBERSHIP_COLUMNS);
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let row = sqlx::query_as::<_, TenantUser>(&sql)
                        .bind(tenant_id)
                        .bind(tenant_user_id)
                        .fetch_optional(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(row)
                })
            })
            .await;
        logged("members.find_membership_by_id", result)
    }

    async fn role_names(&self, tenant_id: Uuid, tenant_user_id: Uuid) -> Result<Vec<String>, DbError> {
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let names: Vec<String> = sqlx::query_scalar(
                        "SELECT r.name FROM tenant_user_roles tur JOIN roles r ON r.id = tur.role_id \
                         WHERE tur.tenant_user_id = $1 AND r.tenant_id = $2 ORDER BY r.name",
                    )
                    .bind(tenant_user_id)
                    .bind(tenant_id)
                    .fetch_all(&mut *conn)
                    .await?;
                    Ok::<_, DbError>(names)
                })
            })
            .await;
        logged("members.role_names", result)
    }

    async fn find_role(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Option<Role>, DbError> {
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let role = sqlx::query_as::<_, Role>(
                        "SELECT id, tenant_id, name, description FROM roles WHERE tenant_id = $1 AND id = $2",
                    )
                    .bind(tenant_id)
                    .bind(role_id)
                    .fetch_optional(&mut *conn)
                    .await?;
                    Ok::<_, DbError>(role)
                })
            })
            .await;
        logged("members.find_role", result)
    }
}
