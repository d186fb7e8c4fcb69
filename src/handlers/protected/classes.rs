// handlers/protected/classes.rs - /v1/classes

use axum::extract::State;
use uuid::Uuid;

use crate::context::TenantScope;
use crate::database::models::{Class, ClassChanges, NewClass, Student};
use crate::database::ListParams;
use crate::middleware::{ApiPath, ApiQuery, ApiResponse, ApiResult, ValidJson};
use crate::services::{BulkDeleteRequest, BulkDeleteResult};
use crate::state::AppState;

pub async fn classes_list(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Vec<Class>> {
    let query = params.resolve(&state.config.app.pagination)?;
    let page = state.classes.list(&scope, &query).await?;
    Ok(ApiResponse::paginated(page))
}

pub async fn classes_get(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Class> {
    let class = state.classes.get(&scope, id).await?;
    Ok(ApiResponse::success(class))
}

/// GET /v1/classes/:id/students - Students assigned to the class
pub async fn classes_students(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Vec<Student>> {
    let students = state.classes.students(&scope, id).await?;
    Ok(ApiResponse::success(students))
}

/// POST /v1/classes - `code` is unique within the tenant (409 otherwise)
pub async fn classes_create(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidJson(input): ValidJson<NewClass>,
) -> ApiResult<Class> {
    let class = state.classes.create(&scope, input).await?;
    Ok(ApiResponse::created(class).with_message("Class created successfully"))
}

pub async fn classes_update(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<ClassChanges>,
) -> ApiResult<Class> {
    let class = state.classes.update(&scope, id, input).await?;
    Ok(ApiResponse::success(class).with_message("Class updated successfully"))
}

/// DELETE /v1/classes/:id - Its students stay, unassigned
pub async fn classes_delete(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.classes.delete(&scope, id).await?;
    Ok(ApiResponse::message("Class deleted successfully"))
}

pub async fn classes_bulk_delete(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidJson(input): ValidJson<BulkDeleteRequest>,
) -> ApiResult<BulkDeleteResult> {
    let result = state.classes.bulk_delete(&scope, &input.ids).await?;
    Ok(ApiResponse::success(result).with_message("Classes deleted successfully"))
}
