//! Pieces shared by the tenant-scoped CRUD services.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::context::TenantScope;
use crate::database::query_builder::{ListColumns, ListQuery};
use crate::database::repository::CrudRepository;
use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkDeleteRequest {
    #[validate(length(min = 1, max = 500))]
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkDeleteResult {
    pub deleted: u64,
    /// Requested ids that do not exist in the active tenant.
    pub skipped: Vec<Uuid>,
}

/// Reject a `sort_by` outside the entity's whitelist.
pub(crate) fn check_sort(columns: &ListColumns, query: &ListQuery) -> Result<(), ApiError> {
    if columns.sort_expression(query.sort_by.as_deref()).is_some() {
        return Ok(());
    }
    let mut fields = HashMap::new();
    fields.insert(
        "sort_by".to_string(),
        format!("must be one of: {}", columns.sort_names().join(", ")),
    );
    Err(ApiError::validation_failed("invalid sort_by", Some(fields)))
}

/// One-field validation error.
pub(crate) fn field_error(field: &str, reason: impl Into<String>) -> ApiError {
    let reason = reason.into();
    let mut fields = HashMap::new();
    fields.insert(field.to_string(), reason.clone());
    ApiError::validation_failed(format!("{}: {}", field, reason), Some(fields))
}

/// Delete the in-tenant subset of `ids`.
///
/// Ids outside the tenant are reported at warn and returned as `skipped`;
/// an empty intersection is an error.
pub(crate) async fn bulk_delete<R, E, C, U>(
    repo: &R,
    scope: &TenantScope,
    entity: &'static str,
    ids: &[Uuid],
) -> Result<BulkDeleteResult, ApiError>
where
    R: CrudRepository<E, C, U> + ?Sized,
{
    let mut seen = HashSet::new();
    let requested: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
    if requested.is_empty() {
        return Err(field_error("ids", "must not be empty"));
    }

    let existing: HashSet<Uuid> = repo
        .existing_ids(scope.tenant_id(), &requested)
        .await?
        .into_iter()
        .collect();
    let (valid, skipped): (Vec<Uuid>, Vec<Uuid>) =
        requested.into_iter().partition(|id| existing.contains(id));

    if !skipped.is_empty() {
        warn!(
            request_id = %scope.request_id(),
            tenant_id = %scope.tenant_id(),
            user_id = %scope.user_id(),
            entity,
            invalid_ids = ?skipped,
            "bulk delete ignored ids outside the tenant"
        );
    }
    if valid.is_empty() {
        return Err(ApiError::not_found(format!("no {} found for the given ids", entity)));
    }

    let deleted = repo.bulk_delete(scope.tenant_id(), &valid).await?;
    info!(
        request_id = %scope.request_id(),
        tenant_id = %scope.tenant_id(),
        user_id = %scope.user_id(),
        entity,
        deleted,
        "bulk delete completed"
    );
    Ok(BulkDeleteResult { deleted, skipped })
}
