use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::context::TenantScope;
use crate::error::ApiError;

/// Per-collection allow-list of role names, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct RoleGate {
    allowed: Arc<[String]>,
}

impl RoleGate {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: roles.into_iter().map(|r| r.as_ref().trim().to_lowercase()).collect(),
        }
    }

    pub fn allows(&self, role: Option<&str>) -> bool {
        match role.map(str::trim).filter(|r| !r.is_empty()) {
            Some(role) => self.allowed.iter().any(|allowed| allowed.eq_ignore_ascii_case(role)),
            None => false,
        }
    }
}

/// Runs inside the tenant gate; the role is the one carried by the scope.
pub async fn require_role(State(gate): State<RoleGate>, request: Request, next: Next) -> Result<Response, ApiError> {
    let role = request
        .extensions()
        .get::<TenantScope>()
        .and_then(|scope| scope.role().map(str::to_string));

    if !gate.allows(role.as_deref()) {
        warn!(role = role.as_deref().unwrap_or(""), allowed = ?gate.allowed, "role not permitted");
        return Err(ApiError::forbidden("insufficient role for this resource"));
    }
    Ok(next.run(request).await)
}
