//! Repository capability set. Services depend on these traits; the Postgres
//! implementations live in `database::postgres`.
//!
//! Every method taking a `tenant_id` is tenant-scoped: the implementation
//! activates that tenant for its statements and also filters on
//! `tenant_id` explicitly.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::manager::{DbError, StoreHealth};
use super::models::{
    Class, ClassChanges, MemberChanges, NewClass, NewMember, NewStudent, NewUser, Role, Student,
    StudentChanges, TenantMember, TenantUser, User, UserTenant,
};
use super::query_builder::ListQuery;

/// Minimum operations for one tenant-scoped entity.
///
/// `E` is the stored entity, `C` its creation payload, `U` its change set.
#[async_trait]
pub trait CrudRepository<E, C, U>: Send + Sync {
    async fn create(&self, tenant_id: Uuid, input: &C) -> Result<E, DbError>;

    /// `NotFound` when the row is missing or belongs to another tenant.
    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<E, DbError>;

    async fn update(&self, tenant_id: Uuid, id: Uuid, changes: &U) -> Result<E, DbError>;

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError>;

    /// One page plus the total row count for the same filter.
    async fn list(&self, tenant_id: Uuid, query: &ListQuery) -> Result<(Vec<E>, i64), DbError>;

    /// The subset of `ids` that exist in this tenant.
    async fn existing_ids(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<Vec<Uuid>, DbError>;

    async fn bulk_delete(&self, tenant_id: Uuid, ids: &[Uuid]) -> Result<u64, DbError>;
}

/// Global identity lookups; no tenant is active for these.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, input: &NewUser) -> Result<User, DbError>;
    async fn get_by_id(&self, id: Uuid) -> Result<User, DbError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DbError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DbError>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DbError>;
}

/// Tenant memberships. The CRUD half backs `/v1/users`; multi-table writes
/// (user + membership + role) are atomic.
#[async_trait]
pub trait MembershipRepository: CrudRepository<TenantMember, NewMember, MemberChanges> {
    /// Active memberships of `user_id` across tenants, tenant loaded.
    async fn list_user_tenants(&self, user_id: Uuid) -> Result<Vec<UserTenant>, DbError>;

    /// Bind an existing user into the tenant, with an optional role, atomically.
    async fn link_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        is_active: bool,
        role_id: Option<Uuid>,
    ) -> Result<TenantMember, DbError>;

    async fn find_membership(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Option<TenantUser>, DbError>;

    async fn find_membership_by_id(
        &self,
        tenant_id: Uuid,
        tenant_user_id: Uuid,
    ) -> Result<Option<TenantUser>, DbError>;

    /// Role names of a membership, sorted.
    async fn role_names(&self, tenant_id: Uuid, tenant_user_id: Uuid) -> Result<Vec<String>, DbError>;

    async fn find_role(&self, tenant_id: Uuid, role_id: Uuid) -> Result<Option<Role>, DbError>;
}

#[async_trait]
pub trait StudentRepository: CrudRepository<Student, NewStudent, StudentChanges> {
    async fn find_by_student_number(
        &self,
        tenant_id: Uuid,
        student_number: &str,
    ) -> Result<Option<Student>, DbError>;

    async fn list_by_class(&self, tenant_id: Uuid, class_id: Uuid) -> Result<Vec<Student>, DbError>;

    async fn list_filtered(
        &self,
        tenant_id: Uuid,
        query: &ListQuery,
        class_id: Option<Uuid>,
    ) -> Result<(Vec<Student>, i64), DbError>;
}

#[async_trait]
pub trait ClassRepository: CrudRepository<Class, NewClass, ClassChanges> {
    async fn find_by_code(&self, tenant_id: Uuid, code: &str) -> Result<Option<Class>, DbError>;
}

/// The full set of store collaborators, as handed to services.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub members: Arc<dyn MembershipRepository>,
    pub students: Arc<dyn StudentRepository>,
    pub classes: Arc<dyn ClassRepository>,
    pub health: Arc<dyn StoreHealth>,
}
