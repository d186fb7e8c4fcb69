use std::sync::Arc;
use thiserror::Error;

use crate::auth::{PasswordError, PasswordHasher, TokenError, TokenService};
use crate::config::AppConfig;
use crate::database::{Repositories, StoreHealth, TenantContext};
use crate::services::{AuthService, ClassService, StudentService, UserService};

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Everything handlers and middleware share, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    pub tenant_context: Arc<dyn TenantContext>,
    pub health: Arc<dyn StoreHealth>,
    pub auth: AuthService,
    pub users: UserService,
    pub students: StudentService,
    pub classes: ClassService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        repos: Repositories,
        tenant_context: Arc<dyn TenantContext>,
    ) -> Result<Self, StateError> {
        let tokens = TokenService::from_config(&config.jwt)?;
        let hasher = PasswordHasher::new(&config.app.password)?;

        Ok(Self {
            auth: AuthService::new(repos.users.clone(), repos.members.clone(), tokens.clone(), hasher.clone()),
            users: UserService::new(repos.users.clone(), repos.members.clone(), hasher),
            students: StudentService::new(repos.students.clone(), repos.members.clone(), repos.classes.clone()),
            classes: ClassService::new(repos.classes.clone(), repos.students.clone()),
            health: repos.health,
            tokens,
            tenant_context,
            config: Arc::new(config),
        })
    }
}
