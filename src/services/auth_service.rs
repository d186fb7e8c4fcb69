use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{PasswordError, PasswordHasher, TokenError, TokenService};
use crate::context::Identity;
use crate::database::models::{NewUser, TenantUser, User, UserTenant};
use crate::database::repository::{MembershipRepository, UserRepository};
use crate::database::DbError;
use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
}

/// Only presence is checked: a malformed email must fail like any other bad login.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SelectTenantRequest {
    pub tenant_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectTenantResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub tenant_id: Uuid,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub tenant_id: Option<Uuid>,
    pub role: Option<String>,
}

/// Two-phase authentication: credentials yield a no-tenant token, tenant
/// selection yields a tenant-scoped one.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    members: Arc<dyn MembershipRepository>,
    tokens: TokenService,
    hasher: PasswordHasher,
}

fn login_failed() -> ApiError {
    ApiError::unauthorized("invalid email or password").with_message("Login failed")
}

fn hashing_failed(err: PasswordError) -> ApiError {
    error!(error = %err, "password hashing failed");
    ApiError::internal("internal server error")
}

fn signing_failed(err: TokenError) -> ApiError {
    error!(error = %err, "token signing failed");
    ApiError::internal("internal server error")
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        members: Arc<dyn MembershipRepository>,
        tokens: TokenService,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            users,
            members,
            tokens,
            hasher,
        }
    }

    /// Creates a global user with no tenant membership.
    pub async fn register(&self, input: RegisterRequest) -> Result<User, ApiError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();

        if self.users.find_by_username(&username).await?.is_some() {
            warn!(%username, "registration rejected: username taken");
            return Err(ApiError::conflict("username already exists"));
        }
        if self.users.find_by_email(&email).await?.is_some() {
            warn!(%email, "registration rejected: email taken");
            return Err(ApiError::conflict("email already exists"));
        }

        let password_hash = self
            .hasher
            .hash_blocking(input.password)
            .await
            .map_err(hashing_failed)?;

        let user = self
            .users
            .create(&NewUser {
                username,
                email,
                password_hash,
                full_name: input.full_name.trim().to_string(),
                phone: input.phone,
            })
            .await?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Unknown email, inactive user and wrong password fail identically.
    pub async fn login(&self, input: LoginRequest) -> Result<LoginResponse, ApiError> {
        let email = input.email.trim().to_lowercase();

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                warn!("login failed: unknown email");
                return Err(login_failed());
            }
        };

        if !user.is_active {
            warn!(user_id = %user.id, "login failed: user inactive");
            return Err(login_failed());
        }

        match self
            .hasher
            .verify_blocking(input.password, user.password_hash.clone())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(user_id = %user.id, "login failed: wrong password");
                return Err(login_failed());
            }
            Err(PasswordError::MalformedHash(e)) => {
                error!(user_id = %user.id, error = %e, "stored password hash is unreadable");
                return Err(login_failed());
            }
            Err(e) => return Err(hashing_failed(e)),
        }

        let issued = self
            .tokens
            .generate(user.id, None, &user.username, &user.email, None)
            .map_err(signing_failed)?;

        info!(user_id = %user.id, "user logged in");
        Ok(LoginResponse {
            token: issued.token,
            expires_at: issued.expires_at,
            user,
        })
    }

    pub async fn user_tenants(&self, identity: &Identity) -> Result<Vec<UserTenant>, ApiError> {
        Ok(self.members.list_user_tenants(identity.user_id).await?)
    }

    /// Issues a token bound to `tenant_id`. The role is the alphabetically
    /// first of the member's roles in that tenant.
    pub async fn select_tenant(
        &self,
        identity: &Identity,
        input: SelectTenantRequest,
    ) -> Result<SelectTenantResponse, ApiError> {
        let tenant_id = input.tenant_id;
        if tenant_id.is_nil() {
            return Err(ApiError::validation_failed("tenant_id is required", None));
        }

        let membership = self.active_membership(identity.user_id, tenant_id).await?;
        let user = self.active_user(identity.user_id).await?;

        let role = self
            .members
            .role_names(tenant_id, membership.id)
            .await?
            .into_iter()
            .next();

        let issued = self
            .tokens
            .generate(user.id, Some(tenant_id), &user.username, &user.email, role.as_deref())
            .map_err(signing_failed)?;

        info!(user_id = %user.id, %tenant_id, role = role.as_deref().unwrap_or(""), "tenant selected");
        Ok(SelectTenantResponse {
            token: issued.token,
            expires_at: issued.expires_at,
            tenant_id,
            role,
        })
    }

    pub async fn change_password(&self, identity: &Identity, input: ChangePasswordRequest) -> Result<(), ApiError> {
        let user = self.active_user(identity.user_id).await?;

        let matches = match self
            .hasher
            .verify_blocking(input.current_password, user.password_hash.clone())
            .await
        {
            Ok(matches) => matches,
            Err(PasswordError::MalformedHash(e)) => {
                error!(user_id = %user.id, error = %e, "stored password hash is unreadable");
                false
            }
            Err(e) => return Err(hashing_failed(e)),
        };
        if !matches {
            warn!(user_id = %user.id, "password change rejected: current password mismatch");
            return Err(ApiError::unauthorized("current password is incorrect"));
        }

        let password_hash = self
            .hasher
            .hash_blocking(input.new_password)
            .await
            .map_err(hashing_failed)?;
        self.users.update_password(user.id, &password_hash).await?;

        info!(user_id = %user.id, "password changed");
        Ok(())
    }

    pub async fn me(&self, identity: &Identity) -> Result<MeResponse, ApiError> {
        let user = self.active_user(identity.user_id).await?;
        Ok(MeResponse {
            user,
            tenant_id: identity.tenant_id,
            role: identity.role.clone(),
        })
    }

    /// Per-request check behind the tenant gate: a tenant token stops working
    /// as soon as its membership or its user is deactivated or removed.
    pub async fn authorize_tenant(&self, identity: &Identity, tenant_id: Uuid) -> Result<TenantUser, ApiError> {
        let membership = self.active_membership(identity.user_id, tenant_id).await?;
        self.active_user(identity.user_id).await?;
        Ok(membership)
    }

    async fn active_membership(&self, user_id: Uuid, tenant_id: Uuid) -> Result<TenantUser, ApiError> {
        match self.members.find_membership(tenant_id, user_id).await? {
            Some(membership) if membership.is_active => Ok(membership),
            Some(_) => {
                warn!(%user_id, %tenant_id, "tenant access denied: membership inactive");
                Err(ApiError::forbidden("no active membership in this tenant"))
            }
            None => {
                warn!(%user_id, %tenant_id, "tenant access denied: not a member");
                Err(ApiError::forbidden("no active membership in this tenant"))
            }
        }
    }

    /// The token outlives the account; a deleted or deactivated user is 401.
    async fn active_user(&self, user_id: Uuid) -> Result<User, ApiError> {
        match self.users.get_by_id(user_id).await {
            Ok(user) if user.is_active => Ok(user),
            Ok(_) => {
                warn!(%user_id, "request from inactive user");
                Err(ApiError::unauthorized("user is inactive"))
            }
            Err(DbError::NotFound(_)) => {
                warn!(%user_id, "token refers to a missing user");
                Err(ApiError::unauthorized("user no longer exists"))
            }
            Err(e) => Err(e.into()),
        }
    }
}
