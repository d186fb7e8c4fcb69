// handlers/mod.rs - HTTP handlers by security tier
//
// Public (no auth) → Protected (bearer token; tenant-scoped collections also
// require a tenant-scoped token and pass the role gate).

pub mod protected;
pub mod public;
