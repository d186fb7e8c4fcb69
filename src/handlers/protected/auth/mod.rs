// handlers/protected/auth/mod.rs - Self-service and tenant selection

pub mod password;
pub mod session;

pub use password::change_password_post;
pub use session::{me_get, select_tenant_post, tenants_get};
