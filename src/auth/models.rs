//! Authentication Models
//! Mission: Define user, token and request/response shapes for the session layer

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // bcrypt hash - never serialize; None for OAuth-only accounts
    pub role: UserRole,
    #[serde(skip_serializing)]
    pub google_id: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>, // the single refresh token currently honored
    pub created_at: String,
}

/// User roles for route gating
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum UserRole {
    #[serde(rename = "admin")]
    Admin,
    #[default]
    #[serde(rename = "user")]
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "user" => Some(UserRole::User),
            _ => None,
        }
    }
}

/// Which of the two signing configurations a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject (user_id)
    pub iat: i64,
    pub exp: i64,
    pub jti: String, // unique per issued token
}

/// Input to `CredentialStore::create_user`
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: Option<String>, // plaintext, hashed by the store
    pub role: UserRole,
    pub google_id: Option<String>,
}

/// Register request body. Absent and `null` fields both land as `None` so the
/// handler can answer with its own 400 instead of the extractor's.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Login request body
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Refresh request body (only read in body transport)
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// User response (sanitized)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Register / login response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub message: &'static str,
    pub user: UserResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Refresh response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// GET /me response
#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub success: bool,
    pub user: UserResponse,
}

/// Static profile card shown by the front-end
#[derive(Debug, Serialize)]
pub struct ProfileDetails {
    pub name: String,
    pub profile_image_url: &'static str,
    pub short_bio: &'static str,
}

impl ProfileDetails {
    const IMAGE_URL: &'static str =
        "https://assets.ccbp.in/frontend/react-js/male-avatar-img.png";
    const SHORT_BIO: &'static str = "Lead Software Developer and AI-ML expert";

    pub fn from_user(user: &User) -> Self {
        Self {
            name: user.username.clone(),
            profile_image_url: Self::IMAGE_URL,
            short_bio: Self::SHORT_BIO,
        }
    }
}

/// GET /profile response
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub profile_details: ProfileDetails,
}

/// Plain acknowledgement (logout)
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "u1".to_string(),
            email: "e1@x.com".to_string(),
            password_hash: Some("$2b$04$hash".to_string()),
            role: UserRole::User,
            google_id: Some("google-sub".to_string()),
            refresh_token: Some("refresh".to_string()),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_user_role_serialization() {
        let admin = UserRole::Admin;
        let json = serde_json::to_string(&admin).unwrap();
        assert_eq!(json, r#""admin""#);

        let user: UserRole = serde_json::from_str(r#""user""#).unwrap();
        assert_eq!(user, UserRole::User);
        assert_eq!(UserRole::default(), UserRole::User);
    }

    #[test]
    fn test_user_role_string_conversion() {
        assert_eq!(UserRole::Admin.as_str(), "admin");
        assert_eq!(UserRole::User.as_str(), "user");

        assert_eq!(UserRole::from_str("ADMIN"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_str("user"), Some(UserRole::User));
        assert_eq!(UserRole::from_str("trader"), None);
    }

    #[test]
    fn test_user_serialization_hides_secrets() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("refresh_token").is_none());
        assert!(json.get("google_id").is_none());
        assert_eq!(json["email"], "e1@x.com");
    }

    #[test]
    fn test_user_response_from_user() {
        let user = sample_user();
        let response = UserResponse::from_user(&user);
        assert_eq!(response.id, user.id.to_string());
        assert_eq!(response.username, "u1");
        assert_eq!(response.role, UserRole::User);
    }

    #[test]
    fn test_session_response_omits_absent_tokens() {
        let response = SessionResponse {
            success: true,
            message: "Login successful",
            user: UserResponse::from_user(&sample_user()),
            access_token: None,
            refresh_token: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("accessToken").is_none());
        assert!(json.get("refreshToken").is_none());
    }

    #[test]
    fn test_login_request_defaults_missing_fields() {
        let req: LoginRequest = serde_json::from_str(r#"{"email":"a@b.c"}"#).unwrap();
        assert_eq!(req.email.as_deref(), Some("a@b.c"));
        assert!(req.password.is_none());

        let req: RegisterRequest =
            serde_json::from_str(r#"{"username":"u1","email":null,"password":"pw"}"#).unwrap();
        assert!(req.email.is_none());
        assert_eq!(req.username.as_deref(), Some("u1"));

        let refresh: RefreshRequest = serde_json::from_str(r#"{"refreshToken":"t"}"#).unwrap();
        assert_eq!(refresh.refresh_token.as_deref(), Some("t"));
    }

    #[test]
    fn test_profile_uses_username() {
        let profile = ProfileDetails::from_user(&sample_user());
        assert_eq!(profile.name, "u1");
        assert!(profile.profile_image_url.starts_with("https://"));
    }
}
