//! OAuth sign-in
//! Mission: Turn a provider authorization code into a verified identity, and that
//! identity into a local user

use crate::auth::models::{NewUser, User, UserRole};
use crate::auth::user_store::{CreateUserError, CredentialStore};
use crate::config::GoogleOAuthConfig;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Who the provider says signed in
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    /// Stable provider-side account id
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
}

#[derive(Debug)]
pub enum ProviderError {
    Config(String),
    Exchange(String),
    Profile(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Config(msg) => write!(f, "OAuth provider misconfigured: {}", msg),
            ProviderError::Exchange(msg) => write!(f, "Authorization code exchange failed: {}", msg),
            ProviderError::Profile(msg) => write!(f, "Failed to fetch user profile: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Pluggable identity provider
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Consent-screen URL carrying the CSRF `state`
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError>;

    /// Exchange an authorization code for the signed-in identity
    async fn authenticate(&self, code: &str) -> Result<ProviderIdentity, ProviderError>;
}

/// Google OAuth 2.0 / OpenID Connect client
pub struct GoogleOAuthProvider {
    http_client: reqwest::Client,
    config: GoogleOAuthConfig,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

impl GoogleOAuthProvider {
    pub fn new(http_client: reqwest::Client, config: GoogleOAuthConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthProvider {
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError> {
        reqwest::Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
                ("prompt", "select_account"),
            ],
        )
        .map(String::from)
        .map_err(|e| ProviderError::Config(e.to_string()))
    }

    async fn authenticate(&self, code: &str) -> Result<ProviderIdentity, ProviderError> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Exchange(format!("{} - {}", status, body)));
        }

        let tokens: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Exchange(e.to_string()))?;

        let response = self
            .http_client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Profile(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Profile(format!("status {}", response.status())));
        }

        let info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| ProviderError::Profile(e.to_string()))?;

        let email = info
            .email
            .ok_or_else(|| ProviderError::Profile("no email in profile".to_string()))?;

        debug!("Google identity resolved for {}", email);

        Ok(ProviderIdentity {
            subject: info.sub,
            email,
            email_verified: info.email_verified,
        })
    }
}

/// Find or create the local account for a provider identity.
///
/// Lookup order: linked provider subject, then verified email (which links the
/// account), else a new `user`-role account without a password.
pub async fn resolve_user(store: &dyn CredentialStore, identity: &ProviderIdentity) -> Result<User> {
    if let Some(user) = store.find_by_google_id(&identity.subject).await? {
        return Ok(user);
    }

    if !identity.email_verified {
        bail!("Provider email {} is not verified", identity.email);
    }

    if let Some(user) = link_by_email(store, identity).await? {
        return Ok(user);
    }

    let base = username_base(&identity.email);
    for attempt in 0..5 {
        let username = if attempt == 0 {
            base.clone()
        } else {
            format!("{}_{}", base, &Uuid::new_v4().simple().to_string()[..6])
        };

        let created = store
            .create_user(NewUser {
                username,
                email: identity.email.clone(),
                password: None,
                role: UserRole::User,
                google_id: Some(identity.subject.clone()),
            })
            .await;

        match created {
            Ok(user) => {
                info!(user_id = %user.id, "Created account from Google sign-in: {}", user.email);
                return Ok(user);
            }
            Err(CreateUserError::Duplicate) => {
                // Either the username is taken or the email appeared concurrently.
                if let Some(user) = link_by_email(store, identity).await? {
                    return Ok(user);
                }
            }
            Err(CreateUserError::Other(e)) => return Err(e),
        }
    }

    bail!("Could not allocate a username for {}", identity.email)
}

async fn link_by_email(
    store: &dyn CredentialStore,
    identity: &ProviderIdentity,
) -> Result<Option<User>> {
    let Some(mut user) = store.find_by_email(&identity.email).await? else {
        return Ok(None);
    };

    store
        .link_google_account(&user.id, &identity.subject)
        .await?;
    user.google_id = Some(identity.subject.clone());

    info!(user_id = %user.id, "Linked Google account to existing user {}", user.email);
    Ok(Some(user))
}

/// Local part of an email reduced to `[a-z0-9._-]`
fn username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let cleaned: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .to_lowercase();

    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user_store::SqliteUserStore;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (SqliteUserStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = SqliteUserStore::with_hash_cost(temp_file.path().to_str().unwrap(), 4).unwrap();
        (store, temp_file)
    }

    fn identity(subject: &str, email: &str) -> ProviderIdentity {
        ProviderIdentity {
            subject: subject.to_string(),
            email: email.to_string(),
            email_verified: true,
        }
    }

    #[test]
    fn test_username_base() {
        assert_eq!(username_base("John.Doe+tag@gmail.com"), "john.doetag");
        assert_eq!(username_base("@nothing"), "user");
    }

    #[test]
    fn test_google_authorize_url() {
        let provider = GoogleOAuthProvider::new(
            reqwest::Client::new(),
            GoogleOAuthConfig {
                client_id: "client-1".to_string(),
                client_secret: "secret".to_string(),
                callback_url: "http://localhost:5000/api/auth/google/callback".to_string(),
            },
        );

        let url = reqwest::Url::parse(&provider.authorize_url("state-123").unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["state"], "state-123");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["scope"], "openid email profile");
        assert!(!query.contains_key("client_secret"));
    }

    #[tokio::test]
    async fn test_new_identity_creates_user() {
        let (store, _temp) = create_test_store();

        let user = resolve_user(&store, &identity("sub-1", "new@x.com")).await.unwrap();
        assert_eq!(user.username, "new");
        assert_eq!(user.role, UserRole::User);
        assert!(user.password_hash.is_none());

        let again = resolve_user(&store, &identity("sub-1", "new@x.com")).await.unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn test_existing_email_is_linked() {
        let (store, _temp) = create_test_store();
        let existing = store
            .create_user(NewUser {
                username: "u1".to_string(),
                email: "e1@x.com".to_string(),
                password: Some("pw1".to_string()),
                role: UserRole::User,
                google_id: None,
            })
            .await
            .unwrap();

        let user = resolve_user(&store, &identity("sub-2", "E1@x.com")).await.unwrap();
        assert_eq!(user.id, existing.id);
        assert_eq!(user.google_id.as_deref(), Some("sub-2"));
    }

    #[tokio::test]
    async fn test_username_collision_gets_suffix() {
        let (store, _temp) = create_test_store();
        store
            .create_user(NewUser {
                username: "sam".to_string(),
                email: "sam@one.com".to_string(),
                password: Some("pw".to_string()),
                role: UserRole::User,
                google_id: None,
            })
            .await
            .unwrap();

        let user = resolve_user(&store, &identity("sub-3", "sam@two.com")).await.unwrap();
        assert!(user.username.starts_with("sam_"));
        assert_eq!(user.email, "sam@two.com");
    }

    #[tokio::test]
    async fn test_unverified_email_rejected() {
        let (store, _temp) = create_test_store();
        let mut unverified = identity("sub-4", "who@x.com");
        unverified.email_verified = false;

        assert!(resolve_user(&store, &unverified).await.is_err());
        assert!(store.find_by_email("who@x.com").await.unwrap().is_none());
    }
}
