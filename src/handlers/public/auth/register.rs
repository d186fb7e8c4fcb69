// handlers/public/auth/register.rs - POST /v1/auth/register handler

use axum::extract::State;

use crate::database::models::User;
use crate::middleware::{ApiResponse, ApiResult, ValidJson};
use crate::services::RegisterRequest;
use crate::state::AppState;

/// POST /v1/auth/register - Create a global user account
///
/// No tenant membership and no token are created; log in afterwards.
/// Username or email already in use → 409.
pub async fn register_post(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<RegisterRequest>,
) -> ApiResult<User> {
    let user = state.auth.register(input).await?;
    Ok(ApiResponse::created(user).with_message("Registration successful"))
}
