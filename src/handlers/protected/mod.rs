// handlers/protected/mod.rs - Handlers behind bearer authentication
//
// `auth` accepts any valid token, including a no-tenant one. The collection
// handlers take a `TenantScope` and so only run on a tenant-scoped token.

pub mod auth;
pub mod classes;
pub mod students;
pub mod users;
