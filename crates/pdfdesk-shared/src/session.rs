//! Signed session tokens.
//!
//! A session token is an HS256 JWT carrying [`SessionClaims`] plus `iat`,
//! `exp`, `iss`, `aud` and a random `jti`, so no two tokens are equal.
//! Nothing is persisted for an access token: it stays valid until it
//! expires. The backend keeps a server-side record for refresh tokens only.

use chrono::{DateTime, Duration, Utc};
use cookie::Cookie;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{ACCESS_TOKEN_COOKIE, TOKEN_AUDIENCE, TOKEN_ISSUER};
use crate::error::SessionError;
use crate::types::SessionClaims;

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    #[serde(flatten)]
    session: SessionClaims,
    iat: i64,
    exp: i64,
    iss: String,
    aud: String,
    jti: String,
}

/// Issues and validates session tokens for one secret and lifetime.
#[derive(Clone)]
pub struct SessionSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

impl SessionSigner {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_AUDIENCE]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token valid from now for the signer's lifetime.
    pub fn issue(&self, claims: &SessionClaims) -> Result<String, SessionError> {
        self.issue_at(claims, Utc::now())
    }

    /// Issue a token as if it had been created at `issued_at`.
    pub fn issue_at(
        &self,
        claims: &SessionClaims,
        issued_at: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let token_claims = TokenClaims {
            session: claims.clone(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            jti: Uuid::new_v4().simple().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &token_claims, &self.encoding_key)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    /// Check signature, issuer, audience and expiry, returning the embedded claims.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::Missing);
        }

        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.session)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid,
            })
    }
}

/// Pull a session token from `Authorization: Bearer <token>`, falling back to
/// the `accessToken` cookie.
pub fn extract_session_token(
    authorization: Option<&str>,
    cookie_header: Option<&str>,
) -> Option<String> {
    if let Some(token) = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Some(token.to_string());
    }

    cookie_header.and_then(|header| find_cookie(header, ACCESS_TOKEN_COOKIE))
}

/// Value of the cookie called `name` in a `Cookie:` request header.
pub fn find_cookie(cookie_header: &str, name: &str) -> Option<String> {
    Cookie::split_parse(cookie_header)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse lifetimes written as `15m`, `7d`, `12h`, `30s` or bare seconds.
pub fn parse_lifetime(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: i64 = digits.parse().ok()?;

    let duration = match unit {
        "" | "s" => Duration::seconds(amount),
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        _ => return None,
    };

    (amount > 0).then_some(duration)
}
