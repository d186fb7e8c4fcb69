use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{logged, require_affected};
use crate::database::manager::{Access, Database, DbError};
use crate::database::models::{NewStudent, Student, StudentChanges, STUDENT_COLUMNS};
use crate::database::query_builder::{push_order_and_page, push_tenant_filter, ListQuery};
use crate::database::repository::{CrudRepository, StudentRepository};

const STUDENT_SELECT: &str = "SELECT s.id, s.tenant_id, s.tenant_user_id, s.class_id, s.student_number, \
     s.first_name, s.last_name, s.date_of_birth, s.created_at, s.updated_at FROM students s";

const STUDENT_RETURNING: &str = "RETURNING id, tenant_id, tenant_user_id, class_id, student_number, \
     first_name, last_name, date_of_birth, created_at, updated_at";

pub struct PgStudentRepository {
    db: Database,
}

impl PgStudentRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CrudRepository<Student, NewStudent, StudentChanges> for PgStudentRepository {
    async fn create(&self, tenant_id: Uuid, input: &NewStudent) -> Result<Student, DbError> {
        let input = input.clone();
        let sql = format!(
            "INSERT INTO students (tenant_id, tenant_user_id, class_id, student_number, first_name, \
             last_name, date_of_birth) VALUES ($1, $2, $3, $4, $5, $6, $7) {}",
            STUDENT_RETURNING
        );
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    let student = sqlx::query_as::<_, Student>(&sql)
                        .bind(tenant_id)
                        .bind(input.tenant_user_id)
                        .bind(input.class_id)
                        .bind(&input.student_number)
                        .bind(&input.first_name)
                        .bind(&input.last_name)
                        .bind(input.date_of_birth)
                        .fetch_one(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(student)
                })
            })
            .await;
        logged("students.create", result)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Student, DbError> {
        let sql = format!("{} WHERE s.tenant_id = $1 AND s.id = $2", STUDENT_SELECT);
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, Student>(&sql)
                        .bind(tenant_id)
                        .bind(id)
                        .fetch_optional(&mut *conn)
                        .await?
                        .ok_or(DbError::NotFound("student"))
                })
            })
            .await;
        logged("students.get_by_id", result)
    }

    async fn update(&self, tenant_id: Uuid, id: Uuid, changes: &StudentChanges) -> Result<Student, DbError> {
        let changes = changes.clone();
        let sql = format!(
            "UPDATE students SET class_id = CASE WHEN $3 THEN $4 ELSE class_id END, \
             student_number = COALESCE($5, student_number), first_name = COALESCE($6, first_name), \
             last_name = COALESCE($7, last_name), date_of_birth = COALESCE($8, date_of_birth), \
             updated_at = now() WHERE tenant_id = $1 AND id = $2 {}",
            STUDENT_RETURNING
        );
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    sqlx::query_as::<_, Student>(&sql)
                        .bind(tenant_id)
                        .bind(id)
                        .bind(changes.class_id.is_some())
                        .bind(changes.class_id.flatten())
                        .bind(&changes.student_number)
                        .bind(&changes.first_name)
                        .bind(&changes.last_name)
                        .bind(changes.date_of_birth)
                        .fetch_optional(&mut *conn)
                        .await?
                        .ok_or(DbError::NotFound("student"))
                })
            })
            .await;
        logged("students.update", result)
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    let done = sqlx::query("DELETE FROM students WHERE tenant_id = $1 AND id = $2")
                        .bind(tenant_id)
                        .bind(id)
                        .execute(&mut *conn)
                        .await?;
                    require_affected(done.rows_affected(), "student")
                })
            })
            .await;
        logged("students.delete", result)
    }

    async fn list(&self, tenant_id: Uuid, query: &ListQuery) -> Result<(Vec<Student>, i64), DbError> {
        self.list_filtered(tenant_id, query, None).await
    }

    async fn existing_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Uuid>, DbError> {
        let ids = ids.to_vec();
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let found: Vec<Uuid> =
                        sqlx::query_scalar("SELECT id FROM students WHERE tenant_id = $1 AND id = ANY($2)")
                            .bind(tenant_id)
                            .bind(ids)
                            .fetch_all(&mut *conn)
                            .await?;
                    Ok::<_, DbError>(found)
                })
            })
            .await;
        logged("students.existing_ids", result)
    }

    async fn bulk_delete(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<u64, DbError> {
        let ids = ids.to_vec();
        let result = self
            .db
            .within(tenant_id, Access::Write, move |conn| {
                Box::pin(async move {
                    let done = sqlx::query("DELETE FROM students WHERE tenant_id = $1 AND id = ANY($2)")
                        .bind(tenant_id)
                        .bind(ids)
                        .execute(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(done.rows_affected())
                })
            })
            .await;
        logged("students.bulk_delete", result)
    }
}

#[async_trait]
impl StudentRepository for PgStudentRepository {
    async fn find_by_student_number(
        &self,
        tenant_id: Uuid,
        student_number: &str,
    ) -> Result<Option<Student>, DbError> {
        let sql = format!("{} WHERE s.tenant_id = $1 AND s.student_number = $2", STUDENT_SELECT);
        let student_number = student_number.to_string();
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let student = sqlx::query_as::<_, Student>(&sql)
                        .bind(tenant_id)
                        .bind(&student_number)
                        .fetch_optional(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(student)
                })
            })
            .await;
        logged("students.find_by_student_number", result)
    }

    async fn list_by_class(&self, tenant_id: Uuid, class_id: Uuid) -> Result<Vec<Student>, DbError> {
        let sql = format!(
            "{} WHERE s.tenant_id = $1 AND s.class_id = $2 ORDER BY s.last_name, s.first_name, s.id",
            STUDENT_SELECT
        );
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let students = sqlx::query_as::<_, Student>(&sql)
                        .bind(tenant_id)
                        .bind(class_id)
                        .fetch_all(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(students)
                })
            })
            .await;
        logged("students.list_by_class", result)
    }

    async fn list_filtered(
        &self,
        tenant_id: Uuid,
        query: &ListQuery,
        class_id: Option<Uuid>,
    ) -> Result<(Vec<Student>, i64), DbError> {
        let query = query.clone();
        let result = self
            .db
            .within(tenant_id, Access::Read, move |conn| {
                Box::pin(async move {
                    let search = query.search.as_deref();

                    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM students s");
                    push_tenant_filter(&mut count, "s.tenant_id", tenant_id, &STUDENT_COLUMNS, search);
                    if let Some(class_id) = class_id {
                        count.push(" AND s.class_id = ").push_bind(class_id);
                    }
                    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

                    let mut select = QueryBuilder::<Postgres>::new(STUDENT_SELECT);
                    push_tenant_filter(&mut select, "s.tenant_id", tenant_id, &STUDENT_COLUMNS, search);
                    if let Some(class_id) = class_id {
                        select.push(" AND s.class_id = ").push_bind(class_id);
                    }
                    push_order_and_page(&mut select, &STUDENT_COLUMNS, &query);
                    let items = select.build_query_as::<Student>().fetch_all(&mut *conn).await?;

                    Ok::<_, DbError>((items, total))
                })
            })
            .await;
        logged("students.list", result)
    }
}
