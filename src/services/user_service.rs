use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::crud::{self, check_sort, field_error, BulkDeleteResult};
use crate::auth::PasswordHasher;
use crate::context::TenantScope;
use crate::database::models::{MemberChanges, NewMember, TenantMember, MEMBER_COLUMNS};
use crate::database::query_builder::{ListQuery, Page};
use crate::database::repository::{MembershipRepository, UserRepository};
use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    /// Only used when a new account is created.
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub role_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100))]
    pub full_name: Option<String>,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    pub is_active: Option<bool>,
    pub role_id: Option<Uuid>,
}

/// Members of the active tenant, as managed by tenant admins.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    members: Arc<dyn MembershipRepository>,
    hasher: PasswordHasher,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, members: Arc<dyn MembershipRepository>, hasher: PasswordHasher) -> Self {
        Self { users, members, hasher }
    }

    pub async fn list(&self, scope: &TenantScope, query: &ListQuery) -> Result<Page<TenantMember>, ApiError> {
        check_sort(&MEMBER_COLUMNS, query)?;
        let (items, total) = self.members.list(scope.tenant_id(), query).await?;
        Ok(Page::new(items, query, total))
    }

    pub async fn get(&self, scope: &TenantScope, id: Uuid) -> Result<TenantMember, ApiError> {
        Ok(self.members.get_by_id(scope.tenant_id(), id).await?)
    }

    /// Adds a member to the active tenant.
    ///
    /// When username and email both name one existing account, that account
    /// is linked into the tenant and keeps its own password and profile.
    /// Otherwise a new user is created. Either way the rows land together or
    /// not at all.
    pub async fn create(&self, scope: &TenantScope, input: CreateUserRequest) -> Result<TenantMember, ApiError> {
        let tenant_id = scope.tenant_id();
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();
        let is_active = input.is_active.unwrap_or(true);

        let by_username = self.users.find_by_username(&username).await?;
        let by_email = self.users.find_by_email(&email).await?;

        // Users are global, so their keys are too.
        let existing = match (by_username, by_email) {
            (None, None) => None,
            (Some(a), Some(b)) if a.id == b.id => Some(a),
            (Some(_), None) => {
                warn!(
                    request_id = %scope.request_id(),
                    %tenant_id,
                    %username,
                    "user creation rejected: username taken"
                );
                return Err(ApiError::conflict("username already exists"));
            }
            (None, Some(_)) => {
                warn!(
                    request_id = %scope.request_id(),
                    %tenant_id,
                    %email,
                    "user creation rejected: email taken"
                );
                return Err(ApiError::conflict("email already exists"));
            }
            (Some(_), Some(_)) => {
                warn!(
                    request_id = %scope.request_id(),
                    %tenant_id,
                    %username,
                    %email,
                    "user creation rejected: username and email belong to different users"
                );
                return Err(ApiError::conflict("username and email belong to different users"));
            }
        };

        if let Some(user) = &existing {
            if self.members.find_membership(tenant_id, user.id).await?.is_some() {
                warn!(
                    request_id = %scope.request_id(),
                    %tenant_id,
                    existing_user_id = %user.id,
                    "user creation rejected: already a member"
                );
                return Err(ApiError::conflict("user is already a member of this tenant"));
            }
        }
        if let Some(role_id) = input.role_id {
            self.require_role(scope, role_id).await?;
        }

        let member = match existing {
            Some(user) => {
                self.members
                    .link_user(tenant_id, user.id, is_active, input.role_id)
                    .await?
            }
            None => {
                let Some(password) = input.password else {
                    return Err(field_error("password", "required when creating a new user"));
                };
                let password_hash = self.hasher.hash_blocking(password).await.map_err(|e| {
                    tracing::error!(%tenant_id, error = %e, "password hashing failed");
                    ApiError::internal("internal server error")
                })?;

                self.members
                    .create(
                        tenant_id,
                        &NewMember {
                            username,
                            email,
                            password_hash,
                            full_name: input.full_name.trim().to_string(),
                            phone: input.phone,
                            is_active,
                            role_id: input.role_id,
                        },
                    )
                    .await?
            }
        };

        info!(
            request_id = %scope.request_id(),
            %tenant_id,
            user_id = %scope.user_id(),
            member_id = %member.id,
            member_user_id = %member.user_id,
            "tenant user added"
        );
        Ok(member)
    }

    pub async fn update(&self, scope: &TenantScope, id: Uuid, input: UpdateUserRequest) -> Result<TenantMember, ApiError> {
        let tenant_id = scope.tenant_id();
        if let Some(role_id) = input.role_id {
            self.require_role(scope, role_id).await?;
        }

        let changes = MemberChanges {
            full_name: input.full_name.map(|name| name.trim().to_string()),
            phone: input.phone,
            is_active: input.is_active,
            role_id: input.role_id,
        };
        let member = self.members.update(tenant_id, id, &changes).await?;

        info!(
            request_id = %scope.request_id(),
            %tenant_id,
            user_id = %scope.user_id(),
            member_id = %id,
            "tenant user updated"
        );
        Ok(member)
    }

    /// Removes the membership; the user goes too when no tenant holds it any more.
    pub async fn delete(&self, scope: &TenantScope, id: Uuid) -> Result<(), ApiError> {
        let tenant_id = scope.tenant_id();
        let member = self.members.get_by_id(tenant_id, id).await?;
        if member.user_id == scope.user_id() {
            warn!(
                request_id = %scope.request_id(),
                %tenant_id,
                user_id = %scope.user_id(),
                "refused to delete own membership"
            );
            return Err(ApiError::validation_failed("cannot delete your own membership", None));
        }

        self.members.delete(tenant_id, id).await?;
        info!(
            request_id = %scope.request_id(),
            %tenant_id,
            user_id = %scope.user_id(),
            member_id = %id,
            "tenant user deleted"
        );
        Ok(())
    }

    pub async fn bulk_delete(&self, scope: &TenantScope, ids: &[Uuid]) -> Result<BulkDeleteResult, ApiError> {
        let own = self
            .members
            .find_membership(scope.tenant_id(), scope.user_id())
            .await?
            .map(|m| m.id);
        if own.is_some_and(|own| ids.contains(&own)) {
            warn!(
                request_id = %scope.request_id(),
                tenant_id = %scope.tenant_id(),
                user_id = %scope.user_id(),
                "refused to bulk delete own membership"
            );
            return Err(ApiError::validation_failed("cannot delete your own membership", None));
        }

        crud::bulk_delete::<_, TenantMember, NewMember, MemberChanges>(&*self.members, scope, "users", ids).await
    }

    async fn require_role(&self, scope: &TenantScope, role_id: Uuid) -> Result<(), ApiError> {
        if self.members.find_role(scope.tenant_id(), role_id).await?.is_none() {
            warn!(
                request_id = %scope.request_id(),
                tenant_id = %scope.tenant_id(),
                %role_id,
                "role not found in tenant"
            );
            return Err(field_error("role_id", "role not found in this tenant"));
        }
        Ok(())
    }
}
