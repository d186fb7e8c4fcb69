pub mod manager;
pub mod models;
pub mod postgres;
pub mod query_builder;
pub mod repository;
pub mod tenant_context;

pub use manager::{Access, Database, DbError, StoreHealth};
pub use query_builder::{ListParams, ListQuery, Page, PageMeta};
pub use repository::{
    ClassRepository, CrudRepository, MembershipRepository, Repositories, StudentRepository, UserRepository,
};
pub use tenant_context::{PgTenantContext, TenantContext};
