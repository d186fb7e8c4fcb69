//! Per-request values carried in request extensions.
//!
//! `RequestContext` exists on every request. `Identity` exists once a bearer
//! token has been validated. `TenantScope` exists only after the tenant gate
//! accepted a tenant-scoped token whose tenant matches the resolved one, so a
//! handler that takes it cannot run on a no-tenant token.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::ApiError;

/// Ambient request value; fields fill in as middleware runs. The tenant gate
/// folds it into the [`TenantScope`] handed to services.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestContext {
    pub request_id: String,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub role: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }
}

/// Authenticated caller, straight from validated claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub tenant_id: Option<Uuid>,
    pub role: Option<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            username: claims.username,
            email: claims.email,
            tenant_id: claims.tenant_id,
            role: claims.role,
        }
    }
}

/// Proof that a tenant was resolved and authorized for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    request_id: String,
    tenant_id: Uuid,
    user_id: Uuid,
    role: Option<String>,
}

impl TenantScope {
    pub(crate) fn new(request_id: String, tenant_id: Uuid, user_id: Uuid, role: Option<String>) -> Self {
        Self {
            request_id,
            tenant_id,
            user_id,
            role,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("authentication required"))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for TenantScope {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantScope>()
            .cloned()
            .ok_or_else(|| ApiError::tenant_required("tenant context required"))
    }
}
