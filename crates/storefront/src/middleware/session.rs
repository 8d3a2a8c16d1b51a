//! Session layer.
//!
//! Sessions live in `PostgreSQL` (`tower_sessions.session`, created by the
//! storefront migrations). This service reads the shopper identity written by
//! the authentication collaborator and keeps the current cart id; nothing
//! else goes in the session.

use sqlx::PgPool;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;
use url::Url;

use crate::config::StorefrontConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "gm_session";

/// Carts are kept for a month of inactivity.
const SESSION_IDLE_DAYS: i64 = 30;

/// Cookie attributes derived from the public base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CookiePolicy {
    secure: bool,
}

impl CookiePolicy {
    /// `Secure` cookies whenever the storefront is served over HTTPS.
    ///
    /// An unparseable base URL gets secure cookies; a plain-HTTP deployment
    /// then fails loudly in the browser instead of leaking the cookie.
    fn for_base_url(base_url: &str) -> Self {
        let secure = Url::parse(base_url).map_or(true, |url| url.scheme() != "http");
        Self { secure }
    }
}

/// Create the session layer backed by `pool`.
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &StorefrontConfig,
) -> SessionManagerLayer<PostgresStore> {
    let policy = CookiePolicy::for_base_url(&config.base_url);
    if !policy.secure {
        tracing::warn!(base_url = %config.base_url, "Session cookies are not marked Secure");
    }

    SessionManagerLayer::new(PostgresStore::new(pool.clone()))
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::days(SESSION_IDLE_DAYS)))
        .with_secure(policy.secure)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_policy_https_is_secure() {
        assert!(CookiePolicy::for_base_url("https://shop.example.org").secure);
    }

    #[test]
    fn test_cookie_policy_plain_http_is_not_secure() {
        assert!(!CookiePolicy::for_base_url("http://localhost:3000").secure);
    }

    #[test]
    fn test_cookie_policy_unparseable_url_is_secure() {
        assert!(CookiePolicy::for_base_url("not a url").secure);
    }
}
