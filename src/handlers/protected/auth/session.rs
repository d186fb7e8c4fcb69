// handlers/protected/auth/session.rs - Tenant listing, tenant selection, whoami

use axum::extract::State;

use crate::context::Identity;
use crate::database::models::UserTenant;
use crate::middleware::{ApiResponse, ApiResult, ValidJson};
use crate::services::{MeResponse, SelectTenantRequest, SelectTenantResponse};
use crate::state::AppState;

/// GET /v1/auth/tenants - Active memberships of the caller, tenant included
pub async fn tenants_get(State(state): State<AppState>, identity: Identity) -> ApiResult<Vec<UserTenant>> {
    let tenants = state.auth.user_tenants(&identity).await?;
    Ok(ApiResponse::success(tenants))
}

/// POST /v1/auth/select-tenant - Exchange any valid token for a tenant-scoped one
///
/// Expected Input:
/// ```json
/// { "tenant_id": "7d0f..." }
/// ```
///
/// No active membership in that tenant → 403. The previous token stays
/// valid until it expires.
pub async fn select_tenant_post(
    State(state): State<AppState>,
    identity: Identity,
    ValidJson(input): ValidJson<SelectTenantRequest>,
) -> ApiResult<SelectTenantResponse> {
    let response = state.auth.select_tenant(&identity, input).await?;
    Ok(ApiResponse::success(response).with_message("Tenant selected"))
}

/// GET /v1/auth/me - The caller's account plus the tenant and role of the token
pub async fn me_get(State(state): State<AppState>, identity: Identity) -> ApiResult<MeResponse> {
    let me = state.auth.me(&identity).await?;
    Ok(ApiResponse::success(me))
}
