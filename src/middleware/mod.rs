pub mod auth;
pub mod cors;
pub mod extract;
pub mod request_context;
pub mod response;
pub mod role;
pub mod tenant;

pub use auth::authenticate;
pub use cors::{cors_layer, preflight_no_content};
pub use extract::{ApiPath, ApiQuery, ValidJson};
pub use request_context::{request_context, REQUEST_ID_HEADER};
pub use response::{ApiResponse, ApiResult};
pub use role::{require_role, RoleGate};
pub use tenant::{require_tenant, resolve_tenant, ResolvedTenant, TENANT_HEADER};
