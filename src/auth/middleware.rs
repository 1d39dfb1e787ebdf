//! Authentication Middleware
//! Mission: Gate routes on a valid access token, a live user record and an allowed role

use crate::auth::{
    cookies::ACCESS_COOKIE,
    error::AuthApiError,
    jwt::JwtHandler,
    models::{TokenKind, User, UserRole},
    user_store::CredentialStore,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Roles allowed through a gate. Empty means any authenticated user.
#[derive(Debug, Clone, Default)]
pub struct RoleGate {
    allowed: HashSet<UserRole>,
}

impl RoleGate {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn only(roles: impl IntoIterator<Item = UserRole>) -> Self {
        Self {
            allowed: roles.into_iter().collect(),
        }
    }

    pub fn permits(&self, role: UserRole) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&role)
    }
}

/// State for one gated route group
#[derive(Clone)]
pub struct SessionGate {
    pub store: Arc<dyn CredentialStore>,
    pub jwt_handler: Arc<JwtHandler>,
    pub roles: RoleGate,
}

impl SessionGate {
    /// Resolve the user behind a request or say why not
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<User, AuthApiError> {
        let token = extract_token(headers).ok_or(AuthApiError::NotAuthorized)?;

        let user_id = self
            .jwt_handler
            .verify(TokenKind::Access, &token)
            .map_err(|e| {
                debug!("Rejected access token: {:#}", e);
                AuthApiError::NotAuthorized
            })?;

        let user = self
            .store
            .find_by_id(&user_id)
            .await?
            .ok_or(AuthApiError::UserNotFound)?;

        if !self.roles.permits(user.role) {
            warn!(
                user_id = %user.id,
                role = user.role.as_str(),
                "Role not allowed on this route"
            );
            return Err(AuthApiError::Forbidden);
        }

        Ok(user)
    }
}

/// Access token from the `accessToken` cookie, else from `Authorization: Bearer`
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let token_from_cookie = CookieJar::from_headers(headers)
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty());

    token_from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Auth middleware; attaches the loaded user for `CurrentUser`
pub async fn require_session(
    State(gate): State<SessionGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthApiError> {
    let user = gate.authorize(req.headers()).await?;

    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

/// The user attached by `require_session`
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthApiError::NotAuthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::TokenSettings;
    use crate::auth::models::NewUser;
    use crate::auth::user_store::SqliteUserStore;
    use axum::http::{HeaderValue, StatusCode};
    use axum::response::IntoResponse;
    use chrono::Duration;
    use tempfile::NamedTempFile;
    use uuid::Uuid;

    struct Fixture {
        gate: SessionGate,
        store: Arc<SqliteUserStore>,
        _temp: NamedTempFile,
    }

    fn fixture(roles: RoleGate) -> Fixture {
        let temp = NamedTempFile::new().unwrap();
        let store =
            Arc::new(SqliteUserStore::with_hash_cost(temp.path().to_str().unwrap(), 4).unwrap());
        let jwt_handler = Arc::new(JwtHandler::new(
            TokenSettings::new("access-secret", Duration::minutes(15)),
            TokenSettings::new("refresh-secret", Duration::days(7)),
        ));
        Fixture {
            gate: SessionGate {
                store: store.clone(),
                jwt_handler,
                roles,
            },
            store,
            _temp: temp,
        }
    }

    async fn create(store: &SqliteUserStore, role: UserRole) -> User {
        store
            .create_user(NewUser {
                username: "u1".to_string(),
                email: "e1@x.com".to_string(),
                password: Some("pw1".to_string()),
                role,
                google_id: None,
            })
            .await
            .unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_role_gate_permits() {
        assert!(RoleGate::any().permits(UserRole::User));
        assert!(RoleGate::any().permits(UserRole::Admin));

        let admins = RoleGate::only([UserRole::Admin]);
        assert!(admins.permits(UserRole::Admin));
        assert!(!admins.permits(UserRole::User));
    }

    #[test]
    fn test_cookie_preferred_over_header() {
        let mut headers = bearer("from-header");
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; accessToken=from-cookie"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_header_fallback_and_missing() {
        assert_eq!(extract_token(&bearer("abc")).as_deref(), Some("abc"));

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_token(&basic).is_none());
        assert!(extract_token(&HeaderMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_valid_token_loads_user() {
        let fx = fixture(RoleGate::any());
        let user = create(&fx.store, UserRole::User).await;
        let token = fx.gate.jwt_handler.issue_access(&user.id).unwrap();

        let loaded = fx.gate.authorize(&bearer(&token)).await.unwrap();
        assert_eq!(loaded.id, user.id);
    }

    #[tokio::test]
    async fn test_missing_and_invalid_tokens_unauthorized() {
        let fx = fixture(RoleGate::any());

        let missing = fx.gate.authorize(&HeaderMap::new()).await.unwrap_err();
        assert_eq!(missing.into_response().status(), StatusCode::UNAUTHORIZED);

        let garbage = fx.gate.authorize(&bearer("garbage")).await.unwrap_err();
        assert_eq!(garbage.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_access() {
        let fx = fixture(RoleGate::any());
        let user = create(&fx.store, UserRole::User).await;
        let refresh = fx.gate.jwt_handler.issue_refresh(&user.id).unwrap();

        let err = fx.gate.authorize(&bearer(&refresh)).await.unwrap_err();
        assert!(matches!(err, AuthApiError::NotAuthorized));
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let fx = fixture(RoleGate::any());
        let token = fx.gate.jwt_handler.issue_access(&Uuid::new_v4()).unwrap();

        let err = fx.gate.authorize(&bearer(&token)).await.unwrap_err();
        assert!(matches!(err, AuthApiError::UserNotFound));
    }

    #[tokio::test]
    async fn test_role_not_in_allow_list_forbidden() {
        let fx = fixture(RoleGate::only([UserRole::Admin]));
        let user = create(&fx.store, UserRole::User).await;
        let token = fx.gate.jwt_handler.issue_access(&user.id).unwrap();

        let err = fx.gate.authorize(&bearer(&token)).await.unwrap_err();
        assert!(matches!(err, AuthApiError::Forbidden));
    }
}
