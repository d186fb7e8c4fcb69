// handlers/protected/users.rs - /v1/users (members of the active tenant)

use axum::extract::State;
use uuid::Uuid;

use crate::context::TenantScope;
use crate::database::models::TenantMember;
use crate::database::ListParams;
use crate::middleware::{ApiPath, ApiQuery, ApiResponse, ApiResult, ValidJson};
use crate::services::{BulkDeleteRequest, BulkDeleteResult, CreateUserRequest, UpdateUserRequest};
use crate::state::AppState;

/// GET /v1/users - Paginated members; `search` matches username, email, full name
pub async fn users_list(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Vec<TenantMember>> {
    let query = params.resolve(&state.config.app.pagination)?;
    let page = state.users.list(&scope, &query).await?;
    Ok(ApiResponse::paginated(page))
}

/// GET /v1/users/:id - One member by membership id
pub async fn users_get(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<TenantMember> {
    let member = state.users.get(&scope, id).await?;
    Ok(ApiResponse::success(member))
}

/// POST /v1/users - Create a user inside the active tenant
///
/// Expected Input:
/// ```json
/// {
///   "username": "jdoe",
///   "email": "jdoe@school.io",
///   "password": "...",
///   "full_name": "Jane Doe",
///   "role_id": "optional role uuid of this tenant"
/// }
/// ```
///
/// An unknown `role_id` is a 400 and nothing is written.
pub async fn users_create(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidJson(input): ValidJson<CreateUserRequest>,
) -> ApiResult<TenantMember> {
    let member = state.users.create(&scope, input).await?;
    Ok(ApiResponse::created(member).with_message("User created successfully"))
}

/// PUT /v1/users/:id - Profile, activation and role changes
pub async fn users_update(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(input): ValidJson<UpdateUserRequest>,
) -> ApiResult<TenantMember> {
    let member = state.users.update(&scope, id, input).await?;
    Ok(ApiResponse::success(member).with_message("User updated successfully"))
}

/// DELETE /v1/users/:id - Remove the membership
pub async fn users_delete(
    State(state): State<AppState>,
    scope: TenantScope,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.users.delete(&scope, id).await?;
    Ok(ApiResponse::message("User deleted successfully"))
}

/// POST /v1/users/bulk-delete - `{ "ids": [...] }`; ids of other tenants are skipped
pub async fn users_bulk_delete(
    State(state): State<AppState>,
    scope: TenantScope,
    ValidJson(input): ValidJson<BulkDeleteRequest>,
) -> ApiResult<BulkDeleteResult> {
    let result = state.users.bulk_delete(&scope, &input.ids).await?;
    Ok(ApiResponse::success(result).with_message("Users deleted successfully"))
}
