pub mod password;
pub mod token;

pub use password::{PasswordError, PasswordHasher};
pub use token::{extract_from_header, Claims, IssuedToken, TokenError, TokenService};
