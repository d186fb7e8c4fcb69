// handlers/public/mod.rs - Handlers reachable without a token

pub mod auth;
pub mod health;

pub use auth::{login_post, register_post};
pub use health::{health_get, root_get};
