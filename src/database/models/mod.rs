pub mod class;
pub mod member;
pub mod role;
pub mod student;
pub mod tenant;
pub mod user;

pub use class::{Class, ClassChanges, NewClass, CLASS_COLUMNS};
pub use member::{MemberChanges, NewMember, TenantMember, MEMBER_COLUMNS};
pub use role::{canonical_role_name, Role};
pub use student::{NewStudent, Student, StudentChanges, StudentFilter, STUDENT_COLUMNS};
pub use tenant::{Tenant, TenantUser, UserTenant};
pub use user::{NewUser, User};
