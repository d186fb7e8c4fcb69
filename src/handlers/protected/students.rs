// handlers/protected/students.rs - /v1/students

use axum::extract::State;
use uuid::Uuid;

use crate::context::TenantScope;
use crate::database::models::{NewStudent, Student, StudentChanges, StudentFilter};
use crate::database::ListParams;
use crate::middleware::{ApiPath, ApiQuery, ApiResponse, ApiResult, ValidJson};
use crate::services::{BulkDeleteRequest, BulkDeleteResult};
use crate::state::AppState;

/// GET /v1/students - Paginated; optional `class_id` filter
pub async fn students_list(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiQuery(params): ApiQuery<ListParams>,
    ApiQuery(filter): ApiQuery<StudentFilter>,
) -> ApiResult<Vec<Student>> {
    let query = params.resolve(&state.config.app.pagination)?;
    let page = state.students.list(&scope, &query, &filter).await?;
    Ok(ApiResponse::paginated(page))
}

pub async fn students_get(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Student> {
    let student = state.students.get(&scope, id).await?;
    Ok(ApiResponse::success(student))
}

/// GET /v1/students/by-number/:student_number
pub async fn students_get_by_number(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(student_number): ApiPath<String>,
) -> ApiResult<Student> {
    let student = state.students.get_by_student_number(&scope, &student_number).await?;
    Ok(ApiResponse::success(student))
}

/// POST /v1/students
///
/// `tenant_user_id` must be an active member of the active tenant and
/// `class_id`, when given, a class of it. Duplicate `student_number` → 409.
pub async fn students_create(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidJson(input): ValidJson<NewStudent>,
) -> ApiResult<Student> {
    let student = state.students.create(&scope, input).await?;
    Ok(ApiResponse::created(student).with_message("Student created successfully"))
}

pub async fn students_update(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<StudentChanges>,
) -> ApiResult<Student> {
    let student = state.students.update(&scope, id, input).await?;
    Ok(ApiResponse::success(student).with_message("Student updated successfully"))
}

pub async fn students_delete(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.students.delete(&scope, id).await?;
    Ok(ApiResponse::message("Student deleted successfully"))
}

pub async fn students_bulk_delete(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidJson(input): ValidJson<BulkDeleteRequest>,
) -> ApiResult<BulkDeleteResult> {
    let result = state.students.bulk_delete(&scope, &input.ids).await?;
    Ok(ApiResponse::success(result).with_message("Students deleted successfully"))
}
