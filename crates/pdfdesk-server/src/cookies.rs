use axum::http::header::SET_COOKIE;
use axum::http::HeaderName;
use axum::response::AppendHeaders;
use cookie::time::Duration;
use cookie::{Cookie, SameSite};

use pdfdesk_shared::constants::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};

fn base(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .path("/")
        .secure(secure)
        .same_site(if secure { SameSite::Strict } else { SameSite::Lax })
        .build()
}

/// `Set-Cookie` value for one HTTP-only auth cookie.
pub fn auth_cookie(name: &'static str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = base(name, value.to_string(), secure);
    cookie.set_max_age(Duration::seconds(max_age_secs));
    cookie.to_string()
}

/// `Set-Cookie` value that deletes `name` in the browser.
pub fn clearing_cookie(name: &'static str, secure: bool) -> String {
    let mut cookie = base(name, String::new(), secure);
    cookie.make_removal();
    cookie.to_string()
}

/// Both auth cookies for a freshly issued token pair.
pub fn session_cookies(
    access_token: &str,
    access_ttl_secs: i64,
    refresh_token: &str,
    refresh_ttl_secs: i64,
    secure: bool,
) -> AppendHeaders<[(HeaderName, String); 2]> {
    AppendHeaders([
        (
            SET_COOKIE,
            auth_cookie(ACCESS_TOKEN_COOKIE, access_token, access_ttl_secs, secure),
        ),
        (
            SET_COOKIE,
            auth_cookie(REFRESH_TOKEN_COOKIE, refresh_token, refresh_ttl_secs, secure),
        ),
    ])
}

pub fn cleared_session_cookies(secure: bool) -> AppendHeaders<[(HeaderName, String); 2]> {
    AppendHeaders([
        (SET_COOKIE, clearing_cookie(ACCESS_TOKEN_COOKIE, secure)),
        (SET_COOKIE, clearing_cookie(REFRESH_TOKEN_COOKIE, secure)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_cookie_attributes() {
        let value = auth_cookie(ACCESS_TOKEN_COOKIE, "abc", 900, false);
        assert!(value.starts_with("accessToken=abc"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Path=/"));
        assert!(value.contains("Max-Age=900"));
        assert!(value.contains("SameSite=Lax"));
        assert!(!value.contains("Secure"));
    }

    #[test]
    fn secure_cookie_is_strict() {
        let value = auth_cookie(REFRESH_TOKEN_COOKIE, "xyz", 60, true);
        assert!(value.contains("Secure"));
        assert!(value.contains("SameSite=Strict"));
    }

    #[test]
    fn clearing_cookie_expires_immediately() {
        let value = clearing_cookie(ACCESS_TOKEN_COOKIE, false);
        assert!(value.starts_with("accessToken=;"));
        assert!(value.contains("Max-Age=0"));
    }
}
