//! Session cookies

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";
pub const OAUTH_STATE_COOKIE: &str = "oauthState";

/// Attributes shared by every cookie the service sets
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl CookiePolicy {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    // Browsers drop SameSite=None cookies that are not Secure.
    fn same_site(&self) -> SameSite {
        if self.secure {
            SameSite::None
        } else {
            SameSite::Lax
        }
    }

    /// httpOnly cookie living as long as the token it carries
    pub fn session_cookie(
        &self,
        name: &'static str,
        value: String,
        lifetime: chrono::Duration,
    ) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site())
            .max_age(cookie::time::Duration::seconds(lifetime.num_seconds()))
            .build()
    }

    /// Short-lived CSRF state for the OAuth round trip. Lax so it survives
    /// the top-level redirect back from the provider.
    pub fn oauth_state_cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((OAUTH_STATE_COOKIE, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(cookie::time::Duration::minutes(10))
            .build()
    }

    /// Cookie that tells the browser to drop `name`
    pub fn removal(&self, name: &'static str) -> Cookie<'static> {
        let mut cookie = Cookie::build((name, ""))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site())
            .build();
        cookie.make_removal();
        cookie
    }

    /// Add removal cookies for both session tokens.
    ///
    /// Uses `add` rather than `CookieJar::remove`, which only emits a removal
    /// when the request itself carried the cookie.
    pub fn clear_session(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.removal(ACCESS_COOKIE))
            .add(self.removal(REFRESH_COOKIE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_attributes() {
        let policy = CookiePolicy::new(false);
        let cookie =
            policy.session_cookie(ACCESS_COOKIE, "tok".to_string(), chrono::Duration::minutes(15));

        assert_eq!(cookie.name(), "accessToken");
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::seconds(900)));
    }

    #[test]
    fn test_production_cookies_are_secure_cross_site() {
        let policy = CookiePolicy::new(true);
        let cookie =
            policy.session_cookie(REFRESH_COOKIE, "tok".to_string(), chrono::Duration::days(7));

        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
    }

    #[test]
    fn test_removal_cookie_expires_immediately() {
        let cookie = CookiePolicy::new(false).removal(REFRESH_COOKIE);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::ZERO));
    }

    #[test]
    fn test_clear_session_emits_both_removals() {
        let jar = CookiePolicy::new(false).clear_session(CookieJar::new());
        let names: Vec<_> = jar.iter().map(|c| c.name().to_string()).collect();
        assert!(names.contains(&"accessToken".to_string()));
        assert!(names.contains(&"refreshToken".to_string()));
    }
}
