//! Authentication Module
//! Mission: Token-based sessions with refresh rotation, role gating and Google sign-in

pub mod api;
pub mod cookies;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod oauth;
pub mod user_store;

pub use api::AuthState;
pub use error::AuthApiError;
pub use jwt::JwtHandler;
pub use middleware::{require_session, CurrentUser, RoleGate, SessionGate};
pub use oauth::{GoogleOAuthProvider, OAuthProvider};
pub use user_store::{CredentialStore, SqliteUserStore};
