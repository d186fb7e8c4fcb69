pub mod auth_service;
pub mod class_service;
pub mod crud;
pub mod student_service;
pub mod user_service;

pub use auth_service::{
    AuthService, ChangePasswordRequest, LoginRequest, LoginResponse, MeResponse, RegisterRequest,
    SelectTenantRequest, SelectTenantResponse,
};
pub use class_service::ClassService;
pub use crud::{BulkDeleteRequest, BulkDeleteResult};
pub use student_service::StudentService;
pub use user_service::{CreateUserRequest, UpdateUserRequest, UserService};
