use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{logged, require_affected};
use crate::database::manager::{Access, Database, DbError};
use crate::database::models::{Class, ClassChanges, NewClass, CLASS_COLUMNS};
use crate::database::query_builder::{push_order_and_page, push_tenant_filter, ListQuery};
use crate::database::repository::{ClassRepository, CrudRepository};

const CLASS_SELECT: &str = "SELECT c.id, c.tenant_id, c.code, c.name, c.grade_level, c.academic_year, \
     c.created_at, c.updated_at FROM classes c";

const CLASS_RETURNING: &str =
    "RETURNING id, tenant_id, code, name, grade_level, academic_year, created_at, updated_at";

pub struct PgClassRepository {
    db: Database,
}

impl PgClassRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CrudRepository<Class, NewClass, ClassChanges> for PgClassRepository {
    async fn create(&self, tenant_id: Uuid, input: &NewClass) -> Result<Class, DbError> {
        let input = input.clone();
        let sql = format!(
            "INSERT INTO classes (tenant_id, code, name, grade_level, academic_year) \
             VALUES ($1, $2, $3, $4, $5) {}",
            CLASS_RETURNING
        );
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    let class = sqlx::query_as::<_, Class>(&sql)
                        .bind(tenant_id)
                        .bind(&input.code)
                        .bind(&input.name)
                        .bind(input.grade_level)
                        .bind(&input.academic_year)
                        .fetch_one(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(class)
                })
            })
            .await;
        logged("classes.create", result)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Class, DbError> {
        let sql = format!("{} WHERE c.tenant_id = $1 AND c.id = $2", CLASS_SELECT);
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, Class>(&sql)
                        .bind(tenant_id)
                        .bind(id)
                        .fetch_optional(&mut *conn)
                        .await?
                        .ok_or(DbError::NotFound("class"))
                })
            })
            .await;
        logged("classes.get_by_id", result)
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, changes: &ClassChanges) -> Result<Class, DbError> {
        let changes = changes.clone();
        let sql = format!(
            "UPDATE classes SET code = COALESCE($3, code), name = COALESCE($4, name), \
             grade_level = COALESCE($5, grade_level), academic_year = COALESCE($6, academic_year), \
             updated_at = now() WHERE tenant_id = $1 AND id = $2 {}",
            CLASS_RETURNING
        );
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, Class>(&sql)
                        .bind(tenant_id)
                        .bind(id)
                        .bind(&changes.code)
                        .bind(&changes.name)
                        .bind(changes.grade_level)
                        .bind(&changes.academic_year)
                        .fetch_optional(&mut *conn)
                        .await?
                        .ok_or(DbError::NotFound("class"))
                })
            })
            .await;
        logged("classes.update", result)
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    let done = sqlx::query("DELETE FROM classes WHERE tenant_id = $1 AND id = $2")
                        .bind(tenant_id)
                        .bind(id)
                        .execute(&mut *conn)
                        .await?;
                    require_affected(done.rows_affected(), "class")
                })
            })
            .await;
        logged("classes.delete", result)
    }

    async fn list(&self, tenant_id: Uuid, query: &ListQuery) -> Result<(Vec<Class>, i64), DbError> {
        let query = query.clone();
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let search = query.search.as_deref();

                    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM classes c");
                    push_tenant_filter(&mut count, "c.tenant_id", tenant_id, &CLASS_COLUMNS, search);
                    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

                    let mut select = QueryBuilder::<Postgres>::new(CLASS_SELECT);
                    push_tenant_filter(&mut select, "c.tenant_id", tenant_id, &CLASS_COLUMNS, search);
                    push_order_and_page(&mut select, &CLASS_COLUMNS, &query);
                    let items = select.build_query_as::<Class>().fetch_all(&mut *conn).await?;

                    Ok::<_, DbError>((items, total))
                })
            })
            .await;
        logged("classes.list", result)
    }

    async fn existing_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Uuid>, DbError> {
        let ids = ids.to_vec();
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let found: Vec<Uuid> =
                        sqlx::query_scalar("SELECT id FROM classes WHERE tenant_id = $1 AND id = ANY($2)")
                            .bind(tenant_id)
                            .bind(ids)
                            .fetch_all(&mut *conn)
                            .await?;
                    Ok::<_, DbError>(found)
                })
            })
            .await;
        logged("classes.existing_ids", result)
    }

    async fn bulk_delete(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<u64, DbError> {
        let ids = ids.to_vec();
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    let done = sqlx::query("DELETE FROM classes WHERE tenant_id = $1 AND id = ANY($2)")
                        .bind(tenant_id)
                        .bind(ids)
                        .execute(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(done.rows_affected())
                })
            })
            .await;
        logged("classes.bulk_delete", result)
    }
}

#[async_trait]
impl ClassRepository for PgClassRepository {
    async fn find_by_code(&self, tenant_id: Uuid, code: &str) -> Result<Option<Class>, DbError> {
        let sql = format!("{} WHERE c.tenant_id = $1 AND lower(c.code) = lower($2)", CLASS_SELECT);
        let code = code.to_string();
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let class = sqlx::query_as::<_, Class>(&sql)
                        .bind(tenant_id)
                        .bind(&code)
                        .fetch_optional(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(class)
                })
            })
            .await;
        logged("classes.find_by_code", result)
    }
}
