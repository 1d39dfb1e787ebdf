//! Session Gate Backend Library
//!
//! Token-based sessions for a web back-end: registration, credential and
//! Google sign-in, access/refresh token issuance, refresh-token revocation
//! and role-gated routes.

pub mod auth;
pub mod config;
pub mod middleware;
pub mod routes;

pub use config::AuthConfig;
pub use routes::create_router;
