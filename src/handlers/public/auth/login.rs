// handlers/public/auth/login.rs - POST /v1/auth/login handler

use axum::extract::State;

use crate::middleware::{ApiResponse, ApiResult, ValidJson};
use crate::services::{LoginRequest, LoginResponse};
use crate::state::AppState;

/// POST /v1/auth/login - Authenticate and receive a no-tenant token
///
/// Expected Input:
/// ```json
/// { "email": "a@school.io", "password": "..." }
/// ```
///
/// The token carries no tenant; follow up with `GET /v1/auth/tenants` and
/// `POST /v1/auth/select-tenant`. Every credential failure answers:
/// ```json
/// { "success": false, "message": "Login failed", "error": "invalid email or password" }
/// ```
pub async fn login_post(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let response = state.auth.login(input).await?;
    Ok(ApiResponse::success(response).with_message("Login successful"))
}
