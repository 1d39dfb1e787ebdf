//! Authentication API Endpoints
//! Mission: Register, log in, refresh, log out and complete Google sign-in

use crate::auth::{
    cookies::{CookiePolicy, ACCESS_COOKIE, OAUTH_STATE_COOKIE, REFRESH_COOKIE},
    error::AuthApiError,
    jwt::JwtHandler,
    middleware::{CurrentUser, RoleGate, SessionGate},
    models::{
        CurrentUserResponse, LoginRequest, MessageResponse, NewUser, ProfileDetails,
        ProfileResponse, RefreshRequest, RefreshResponse, RegisterRequest, SessionResponse,
        TokenKind, User, UserResponse, UserRole,
    },
    oauth::{self, OAuthProvider},
    user_store::{CreateUserError, CredentialStore},
};
use crate::config::{AuthConfig, TokenTransport};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub store: Arc<dyn CredentialStore>,
    pub jwt_handler: Arc<JwtHandler>,
    pub oauth: Option<Arc<dyn OAuthProvider>>,
    pub transport: TokenTransport,
    pub cookies: CookiePolicy,
    pub client_url: String,
}

impl AuthState {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        jwt_handler: Arc<JwtHandler>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            store,
            jwt_handler,
            oauth: None,
            transport: config.transport,
            cookies: CookiePolicy::new(config.secure_cookies),
            client_url: config.client_url.clone(),
        }
    }

    pub fn with_oauth(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.oauth = Some(provider);
        self
    }

    /// Gate state for a route group restricted to `roles`
    pub fn gate(&self, roles: RoleGate) -> SessionGate {
        SessionGate {
            store: self.store.clone(),
            jwt_handler: self.jwt_handler.clone(),
            roles,
        }
    }

    fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.client_url)
    }

    fn login_failure_url(&self) -> String {
        format!("{}/login?error=authentication_failed", self.client_url)
    }
}

/// A freshly issued token pair whose refresh half is already persisted
struct IssuedSession {
    access_token: String,
    refresh_token: String,
}

/// Issue both tokens and make the new refresh token the only one honored
async fn start_session(state: &AuthState, user: &User) -> Result<IssuedSession, AuthApiError> {
    let access_token = state.jwt_handler.issue_access(&user.id)?;
    let refresh_token = state.jwt_handler.issue_refresh(&user.id)?;

    state
        .store
        .set_refresh_token(&user.id, Some(&refresh_token))
        .await?;

    Ok(IssuedSession {
        access_token,
        refresh_token,
    })
}

/// Hand a session to the client per the configured transport
fn deliver_session(
    state: &AuthState,
    jar: CookieJar,
    session: IssuedSession,
    message: &'static str,
    user: &User,
) -> (CookieJar, Json<SessionResponse>) {
    let (jar, access_token, refresh_token) = match state.transport {
        TokenTransport::Cookie => {
            let jar = jar
                .add(state.cookies.session_cookie(
                    REFRESH_COOKIE,
                    session.refresh_token,
                    state.jwt_handler.lifetime(TokenKind::Refresh),
                ))
                .add(state.cookies.session_cookie(
                    ACCESS_COOKIE,
                    session.access_token,
                    state.jwt_handler.lifetime(TokenKind::Access),
                ));
            (jar, None, None)
        }
        TokenTransport::Body => (
            jar,
            Some(session.access_token),
            Some(session.refresh_token),
        ),
    };

    (
        jar,
        Json(SessionResponse {
            success: true,
            message,
            user: UserResponse::from_user(user),
            access_token,
            refresh_token,
        }),
    )
}

/// Register endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    jar: CookieJar,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>), AuthApiError> {
    const MISSING: &str = "Please provide username, email and password";

    let Json(payload) = payload.map_err(|e| {
        debug!("Unreadable register body: {}", e);
        AuthApiError::MissingFields(MISSING)
    })?;
    let (Some(username), Some(email), Some(password)) = (
        non_blank(payload.username.as_deref()),
        non_blank(payload.email.as_deref()),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AuthApiError::MissingFields(MISSING));
    };

    if state
        .store
        .find_by_email_or_username(email, username)
        .await?
        .is_some()
    {
        info!("Registration rejected, already taken: {} / {}", username, email);
        return Err(AuthApiError::UserAlreadyExists);
    }

    let user = state
        .store
        .create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password: Some(password),
            role: UserRole::User,
            google_id: None,
        })
        .await
        .map_err(|e| match e {
            CreateUserError::Duplicate => AuthApiError::UserAlreadyExists,
            CreateUserError::Other(e) => AuthApiError::Internal(e),
        })?;

    let session = start_session(&state, &user).await?;

    info!(user_id = %user.id, "✅ User registered: {}", user.username);

    let (jar, body) = deliver_session(&state, jar, session, "User registered successfully", &user);
    Ok((StatusCode::CREATED, jar, body))
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<SessionResponse>), AuthApiError> {
    const MISSING: &str = "Please provide email and password";

    let Json(payload) = payload.map_err(|e| {
        debug!("Unreadable login body: {}", e);
        AuthApiError::MissingFields(MISSING)
    })?;
    let (Some(email), Some(password)) = (
        non_blank(payload.email.as_deref()),
        payload.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(AuthApiError::MissingFields(MISSING));
    };

    // Same answer, and the same bcrypt work, for unknown email and wrong password.
    let Some(user) = state.store.check_credentials(email, password).await? else {
        warn!("❌ Failed login attempt: {}", email);
        return Err(AuthApiError::InvalidCredentials);
    };

    let session = start_session(&state, &user).await?;

    info!(
        user_id = %user.id,
        "✅ Login successful: {} ({})",
        user.username,
        user.role.as_str()
    );

    Ok(deliver_session(&state, jar, session, "Login successful", &user))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Get current user info - GET /api/auth/me
pub async fn get_current_user(CurrentUser(user): CurrentUser) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        success: true,
        user: UserResponse::from_user(&user),
    })
}

/// Profile card - GET /api/auth/profile
pub async fn get_profile(CurrentUser(user): CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        success: true,
        profile_details: ProfileDetails::from_user(&user),
    })
}

/// Exchange a refresh token for a new access token - POST /api/auth/refresh-token
///
/// The refresh token itself is not rotated here.
pub async fn refresh_token(
    State(state): State<AuthState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<RefreshResponse>), AuthApiError> {
    let presented = match state.transport {
        TokenTransport::Cookie => jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()),
        TokenTransport::Body => body.and_then(|Json(b)| b.refresh_token),
    }
    .filter(|t| !t.is_empty())
    .ok_or(AuthApiError::MissingRefreshToken)?;

    let user_id = state
        .jwt_handler
        .verify(TokenKind::Refresh, &presented)
        .map_err(|_| AuthApiError::InvalidRefreshToken)?;

    let user = state
        .store
        .find_by_id(&user_id)
        .await?
        .ok_or(AuthApiError::InvalidRefreshToken)?;

    if user.refresh_token.as_deref() != Some(presented.as_str()) {
        warn!(user_id = %user.id, "Refresh token does not match the current session");
        return Err(AuthApiError::InvalidRefreshToken);
    }

    let access_token = state.jwt_handler.issue_access(&user.id)?;

    let (jar, access_token) = match state.transport {
        TokenTransport::Cookie => (
            jar.add(state.cookies.session_cookie(
                ACCESS_COOKIE,
                access_token,
                state.jwt_handler.lifetime(TokenKind::Access),
            )),
            None,
        ),
        TokenTransport::Body => (jar, Some(access_token)),
    };

    Ok((
        jar,
        Json(RefreshResponse {
            success: true,
            message: "Access token refreshed successfully",
            access_token,
        }),
    ))
}

/// Logout - POST /api/auth/logout
pub async fn logout(
    State(state): State<AuthState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), AuthApiError> {
    state.store.set_refresh_token(&user.id, None).await?;

    info!(user_id = %user.id, "User logged out: {}", user.username);

    Ok((
        state.cookies.clear_session(jar),
        Json(MessageResponse {
            success: true,
            message: "Logged out successfully",
        }),
    ))
}

/// List all users - GET /api/admin/users (Admin only)
pub async fn list_users(
    State(state): State<AuthState>,
) -> Result<Json<Vec<UserResponse>>, AuthApiError> {
    let users = state.store.list_users().await?;
    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// Start Google sign-in - GET /api/auth/google
pub async fn google_login(
    State(state): State<AuthState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AuthApiError> {
    let provider = state.oauth.as_ref().ok_or(AuthApiError::OAuthNotConfigured)?;

    let csrf_state = Uuid::new_v4().simple().to_string();
    let auth_url = provider
        .authorize_url(&csrf_state)
        .context("Failed to build Google authorization URL")?;

    Ok((
        jar.add(state.cookies.oauth_state_cookie(csrf_state)),
        Redirect::to(&auth_url),
    ))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Google sign-in callback - GET /api/auth/google/callback
///
/// Always ends in a redirect to the front-end: the dashboard on success, the
/// login page with an error flag otherwise.
pub async fn google_callback(
    State(state): State<AuthState>,
    jar: CookieJar,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    let expected_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.add(state.cookies.removal(OAUTH_STATE_COOKIE));

    match complete_google_login(&state, jar.clone(), expected_state, params).await {
        Ok((jar, location)) => (jar, Redirect::to(&location)).into_response(),
        Err(e) => {
            warn!("Google sign-in failed: {:#}", e);
            (jar, Redirect::to(&state.login_failure_url())).into_response()
        }
    }
}

async fn complete_google_login(
    state: &AuthState,
    jar: CookieJar,
    expected_state: Option<String>,
    params: OAuthCallbackParams,
) -> anyhow::Result<(CookieJar, String)> {
    if let Some(error) = params.error {
        anyhow::bail!("provider returned error: {}", error);
    }

    let provider = state
        .oauth
        .as_ref()
        .context("Google sign-in is not configured")?;

    match (expected_state.as_deref(), params.state.as_deref()) {
        (Some(expected), Some(got)) if expected == got => {}
        _ => anyhow::bail!("OAuth state mismatch"),
    }

    let code = params.code.context("callback without authorization code")?;
    let identity = provider.authenticate(&code).await?;
    let user = oauth::resolve_user(state.store.as_ref(), &identity).await?;

    let session = start_session(state, &user)
        .await
        .map_err(|e| anyhow::anyhow!("failed to start session: {}", e))?;

    info!(user_id = %user.id, "✅ Google sign-in: {}", user.email);

    match state.transport {
        TokenTransport::Cookie => {
            let (jar, _) = deliver_session(state, jar, session, "Login successful", &user);
            Ok((jar, state.dashboard_url()))
        }
        // Fragments never reach servers or logs; the front-end reads them once.
        TokenTransport::Body => Ok((
            jar,
            format!(
                "{}#accessToken={}&refreshToken={}",
                state.dashboard_url(),
                session.access_token,
                session.refresh_token
            ),
        )),
    }
}
