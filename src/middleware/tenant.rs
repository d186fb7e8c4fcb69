//! Tenant resolution and the tenant-required gate.

use axum::{
    extract::{Request, State},
    http::{header::HOST, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use std::net::IpAddr;
use tracing::{error, field, warn, Span};
use uuid::Uuid;

use crate::context::{Identity, RequestContext, TenantScope};
use crate::error::ApiError;
use crate::state::AppState;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const TENANT_QUERY_PARAM: &str = "tenant_id";

/// Where a tenant candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantSource {
    Header,
    Query,
    Subdomain,
}

/// The tenant this request acts on, once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTenant(pub Uuid);

/// First DNS label of `host` when it names a tenant subdomain.
///
/// Needs at least three labels (`<tenant>.example.com`); ports are ignored,
/// IP literals and `www`/`api` never match.
pub fn subdomain(host: &str) -> Option<&str> {
    let host = host.trim();
    let name = match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    if name.is_empty() || name.starts_with('[') || name.parse::<IpAddr>().is_ok() {
        return None;
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 3 {
        return None;
    }
    let first = labels[0];
    if first.is_empty() || first.eq_ignore_ascii_case("www") || first.eq_ignore_ascii_case("api") {
        return None;
    }
    Some(first)
}

/// Header, then query parameter, then subdomain.
pub fn tenant_candidate(headers: &HeaderMap, uri: &Uri) -> Option<(TenantSource, String)> {
    let from_header = headers
        .get(TENANT_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string())
        .filter(|value| !value.is_empty());
    if let Some(value) = from_header {
        return Some((TenantSource::Header, value));
    }

    let from_query = uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == TENANT_QUERY_PARAM)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    });
    if let Some(value) = from_query {
        return Some((TenantSource::Query, value));
    }

    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(subdomain)
        .map(|label| (TenantSource::Subdomain, label.to_string()))
}

fn parse_tenant(source: TenantSource, raw: &str) -> Result<Uuid, ApiError> {
    match Uuid::parse_str(raw) {
        Ok(id) if !id.is_nil() => Ok(id),
        _ => {
            warn!(?source, value = %raw, "invalid tenant id");
            Err(ApiError::invalid_input("invalid tenant id").with_message("Invalid tenant"))
        }
    }
}

/// Resolve the request tenant, cross-check it against the token and
/// activate it on the store for the duration of the request.
///
/// Without an explicit candidate the token's own tenant is used.
pub async fn resolve_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token_tenant = request
        .extensions()
        .get::<Identity>()
        .and_then(|identity| identity.tenant_id);

    let resolved = match tenant_candidate(request.headers(), request.uri()) {
        Some((source, raw)) => Some(parse_tenant(source, &raw)?),
        None => token_tenant,
    };

    let Some(tenant_id) = resolved else {
        return Ok(next.run(request).await);
    };

    if let Some(token_tenant) = token_tenant {
        if token_tenant != tenant_id {
            warn!(%token_tenant, request_tenant = %tenant_id, "tenant mismatch");
            return Err(ApiError::tenant_mismatch("token tenant does not match request tenant"));
        }
    }

    if let Err(e) = state.tenant_context.set(tenant_id).await {
        error!(%tenant_id, error = %e, "failed to set tenant context");
        return Err(ApiError::internal("failed to set tenant context"));
    }

    Span::current().record("tenant_id", field::display(tenant_id));
    if let Some(ctx) = request.extensions_mut().get_mut::<RequestContext>() {
        ctx.tenant_id = Some(tenant_id);
    }
    request.extensions_mut().insert(ResolvedTenant(tenant_id));

    let response = next.run(request).await;

    if let Err(e) = state.tenant_context.clear().await {
        warn!(%tenant_id, error = %e, "failed to clear tenant context");
    }
    Ok(response)
}

/// Admits only tenant-scoped tokens on a resolved tenant whose membership
/// and user are still active, and hands the handler its [`TenantScope`].
pub async fn require_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request
        .extensions()
        .get::<Identity>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("authentication required"))?;

    let Some(ResolvedTenant(tenant_id)) = request.extensions().get::<ResolvedTenant>().copied() else {
        warn!(user_id = %identity.user_id, "tenant required but none resolved");
        return Err(ApiError::tenant_required("tenant context required"));
    };

    match identity.tenant_id {
        Some(token_tenant) if token_tenant == tenant_id => {}
        Some(_) => return Err(ApiError::tenant_mismatch("token tenant does not match request tenant")),
        None => {
            warn!(user_id = %identity.user_id, %tenant_id, "no-tenant token on a tenant-scoped endpoint");
            return Err(ApiError::tenant_required("select a tenant first"));
        }
    }

    state.auth.authorize_tenant(&identity, tenant_id).await?;

    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();
    let scope = TenantScope::new(ctx.request_id, tenant_id, identity.user_id, ctx.role);
    request.extensions_mut().insert(scope);

    Ok(next.run(request).await)
}
