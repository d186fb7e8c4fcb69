//! sqlx implementations of the repository traits.

mod class_repo;
mod membership_repo;
mod student_repo;
mod user_repo;

use std::sync::Arc;
use tracing::{error, warn};

pub use class_repo::PgClassRepository;
pub use membership_repo::PgMembershipRepository;
pub use student_repo::PgStudentRepository;
pub use user_repo::PgUserRepository;

use super::manager::{Database, DbError};
use super::repository::Repositories;

impl Repositories {
    pub fn postgres(db: &Database) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(db.clone())),
            members: Arc::new(PgMembershipRepository::new(db.clone())),
            students: Arc::new(PgStudentRepository::new(db.clone())),
            classes: Arc::new(PgClassRepository::new(db.clone())),
            health: Arc::new(db.clone()),
        }
    }
}

/// Log infrastructure failures and constraint violations with the operation
/// name. Missing rows pass through silently.
pub(crate) fn logged<T>(operation: &'static str, result: Result<T, DbError>) -> Result<T, DbError> {
    if let Err(err) = &result {
        match err {
            DbError::NotFound(_) => {}
            err if err.is_infrastructure() => error!(operation, error = %err, "repository operation failed"),
            _ => warn!(operation, error = %err, "constraint violation"),
        }
    }
    result
}

/// `rows_affected == 0` on a keyed statement means the row was not there.
pub(crate) fn require_affected(rows: u64, what: &'static str) -> Result<(), DbError> {
    if rows == 0 {
        Err(DbError::NotFound(what))
    } else {
        Ok(())
    }
}
