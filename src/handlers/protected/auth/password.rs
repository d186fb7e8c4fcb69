// handlers/protected/auth/password.rs - POST /v1/auth/change-password handler

use axum::extract::State;

use crate::context::Identity;
use crate::middleware::{ApiResponse, ApiResult, ValidJson};
use crate::services::ChangePasswordRequest;
use crate::state::AppState;

/// POST /v1/auth/change-password - Replace the caller's password
///
/// The current password must match (401 otherwise). Issued tokens are not
/// revoked.
pub async fn change_password_post(
    State(state): State<AppState>,
    identity: Identity,
    ValidJson(input): ValidJson<ChangePasswordRequest>,
) -> ApiResult<()> {
    state.auth.change_password(&identity, input).await?;
    Ok(ApiResponse::message("Password changed successfully"))
}
