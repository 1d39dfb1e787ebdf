//! JWT Token Handler
//! Mission: Issue and verify access and refresh tokens under separate secrets

use crate::auth::models::{Claims, TokenKind};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;
use uuid::Uuid;

/// Secret and lifetime for one token kind
#[derive(Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub lifetime: Duration,
}

impl TokenSettings {
    pub fn new(secret: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            secret: secret.into(),
            lifetime,
        }
    }
}

/// JWT Handler for token operations
pub struct JwtHandler {
    access: TokenSettings,
    refresh: TokenSettings,
}

impl JwtHandler {
    pub fn new(access: TokenSettings, refresh: TokenSettings) -> Self {
        Self { access, refresh }
    }

    fn settings(&self, kind: TokenKind) -> &TokenSettings {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Lifetime configured for a token kind (used for cookie max-age)
    pub fn lifetime(&self, kind: TokenKind) -> Duration {
        self.settings(kind).lifetime
    }

    /// Sign a token of the given kind bound to `user_id`
    pub fn issue(&self, kind: TokenKind, user_id: &Uuid) -> Result<String> {
        let settings = self.settings(kind);
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(settings.lifetime)
            .context("Invalid timestamp")?;

        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        debug!(
            "Issuing {} token for user {}, expires {}",
            kind.as_str(),
            user_id,
            expiration.to_rfc3339()
        );

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(settings.secret.as_bytes()),
        )
        .context("Failed to sign JWT")
    }

    pub fn issue_access(&self, user_id: &Uuid) -> Result<String> {
        self.issue(TokenKind::Access, user_id)
    }

    pub fn issue_refresh(&self, user_id: &Uuid) -> Result<String> {
        self.issue(TokenKind::Refresh, user_id)
    }

    /// Check signature and expiry, returning the bound user id
    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<Uuid> {
        let settings = self.settings(kind);
        let mut validation = Validation::default();
        validation.leeway = 0;

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(settings.secret.as_bytes()),
            &validation,
        )
        .context("Invalid or expired token")?;

        let user_id =
            Uuid::parse_str(&decoded.claims.sub).context("Token subject is not a user id")?;

        debug!("Verified {} token for user {}", kind.as_str(), user_id);

        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handler() -> JwtHandler {
        JwtHandler::new(
            TokenSettings::new("access-secret-12345", Duration::minutes(15)),
            TokenSettings::new("refresh-secret-67890", Duration::days(7)),
        )
    }

    #[test]
    fn test_issue_and_verify_both_kinds() {
        let handler = test_handler();
        let user_id = Uuid::new_v4();

        let access = handler.issue_access(&user_id).unwrap();
        let refresh = handler.issue_refresh(&user_id).unwrap();
        assert!(!access.is_empty());
        assert_ne!(access, refresh);

        assert_eq!(handler.verify(TokenKind::Access, &access).unwrap(), user_id);
        assert_eq!(handler.verify(TokenKind::Refresh, &refresh).unwrap(), user_id);
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let handler = test_handler();
        let user_id = Uuid::new_v4();

        let access = handler.issue_access(&user_id).unwrap();
        let refresh = handler.issue_refresh(&user_id).unwrap();

        assert!(handler.verify(TokenKind::Refresh, &access).is_err());
        assert!(handler.verify(TokenKind::Access, &refresh).is_err());
    }

    #[test]
    fn test_tokens_issued_back_to_back_differ() {
        let handler = test_handler();
        let user_id = Uuid::new_v4();

        let first = handler.issue_refresh(&user_id).unwrap();
        let second = handler.issue_refresh(&user_id).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let handler = test_handler();
        assert!(handler.verify(TokenKind::Access, "invalid.token.here").is_err());
        assert!(handler.verify(TokenKind::Access, "").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let handler = test_handler();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            iat: now - 120,
            exp: now - 60,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(handler.access.secret.as_bytes()),
        )
        .unwrap();

        assert!(handler.verify(TokenKind::Access, &token).is_err());
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let handler = test_handler();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            iat: now,
            exp: now + 600,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(handler.access.secret.as_bytes()),
        )
        .unwrap();

        assert!(handler.verify(TokenKind::Access, &token).is_err());
    }

    #[test]
    fn test_lifetime_per_kind() {
        let handler = test_handler();
        assert_eq!(handler.lifetime(TokenKind::Access), Duration::minutes(15));
        assert_eq!(handler.lifetime(TokenKind::Refresh), Duration::days(7));
    }
}
