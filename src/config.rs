//! Service configuration
//! Mission: Read every deploy-time knob from the environment once, at startup

use crate::auth::jwt::TokenSettings;
use anyhow::{bail, Context, Result};
use chrono::Duration;
use std::env;
use tracing::warn;

const DEV_ACCESS_SECRET: &str = "dev-access-secret-change-in-production-minimum-32-chars";
const DEV_REFRESH_SECRET: &str = "dev-refresh-secret-change-in-production-minimum-32-chars";

/// How tokens travel between client and server. Exactly one is active per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTransport {
    /// httpOnly `accessToken` / `refreshToken` cookies
    Cookie,
    /// Tokens in JSON bodies; client sends `Authorization: Bearer`
    Body,
}

impl TokenTransport {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cookie" | "cookies" => Some(TokenTransport::Cookie),
            "body" | "bearer" => Some(TokenTransport::Body),
            _ => None,
        }
    }
}

/// Google OAuth client credentials
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

/// Bootstrap admin account
#[derive(Clone)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub port: u16,
    pub db_path: String,
    pub access: TokenSettings,
    pub refresh: TokenSettings,
    pub client_url: String,
    pub google: Option<GoogleOAuthConfig>,
    pub transport: TokenTransport,
    pub secure_cookies: bool,
    pub admin_seed: Option<AdminSeed>,
}

impl AuthConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup (blank values count as unset)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(p) => p.trim().parse::<u16>().context("Invalid PORT")?,
            None => 5000,
        };

        let secure_cookies = get("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        // Development secrets are public; production must bring its own.
        let secret = |key: &str, dev_default: &str| -> Result<String> {
            match get(key) {
                Some(value) => Ok(value),
                None if secure_cookies => bail!("{} must be set when APP_ENV=production", key),
                None => {
                    warn!("{} not set, using development secret", key);
                    Ok(dev_default.to_string())
                }
            }
        };
        let access_secret = secret("JWT_SECRET", DEV_ACCESS_SECRET)?;
        let refresh_secret = secret("JWT_REFRESH_SECRET", DEV_REFRESH_SECRET)?;
        if access_secret == refresh_secret {
            bail!("JWT_SECRET and JWT_REFRESH_SECRET must differ");
        }

        let access_lifetime = parse_expiry(
            &get("JWT_ACCESS_TOKEN_EXPIRE").unwrap_or_else(|| "15m".to_string()),
        )
        .context("Invalid JWT_ACCESS_TOKEN_EXPIRE")?;
        let refresh_lifetime = parse_expiry(
            &get("JWT_REFRESH_TOKEN_EXPIRE").unwrap_or_else(|| "7d".to_string()),
        )
        .context("Invalid JWT_REFRESH_TOKEN_EXPIRE")?;

        let client_url = get("CLIENT_URL")
            .unwrap_or_else(|| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        let google = match (get("GOOGLE_CLIENT_ID"), get("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                callback_url: get("GOOGLE_CALLBACK_URL").unwrap_or_else(|| {
                    format!("http://localhost:{}/api/auth/google/callback", port)
                }),
            }),
            _ => None,
        };

        let transport = match get("TOKEN_TRANSPORT") {
            Some(raw) => TokenTransport::from_str(&raw)
                .with_context(|| format!("Invalid TOKEN_TRANSPORT: {}", raw))?,
            None => TokenTransport::Cookie,
        };

        let admin_seed = match (get("ADMIN_EMAIL"), get("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                username: get("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            port,
            db_path: get("AUTH_DB_PATH").unwrap_or_else(|| "session_gate_auth.db".to_string()),
            access: TokenSettings::new(access_secret, access_lifetime),
            refresh: TokenSettings::new(refresh_secret, refresh_lifetime),
            client_url,
            google,
            transport,
            secure_cookies,
            admin_seed,
        })
    }
}

/// Parse a token lifetime such as `15m`, `12h`, `7d`, `2w` or `900` (seconds)
pub fn parse_expiry(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);

    if digits.is_empty() {
        bail!("expiry '{}' has no amount", raw);
    }
    let amount: i64 = digits
        .parse()
        .with_context(|| format!("expiry '{}' is out of range", raw))?;
    if amount == 0 {
        bail!("expiry must be positive");
    }

    let seconds_per_unit = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        other => bail!("unknown expiry unit '{}'", other),
    };

    amount
        .checked_mul(seconds_per_unit)
        .map(Duration::seconds)
        .context("expiry is out of range")
}
