//! Verification of Google-issued ID tokens.
//!
//! The verifier is built once at startup from configuration and shared
//! through [`AppState`](crate::api::AppState). Handlers only see the
//! [`IdentityVerifier`] trait, so tests substitute a verifier backed by a
//! static key.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Google's published signing keys.
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Issuers Google uses for ID tokens.
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Identity asserted by a verified third-party token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedIdentity {
    pub email: String,
    pub name: String,
    pub external_id: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Google sign-in is not configured")]
    NotConfigured,

    #[error("Identity token rejected: {0}")]
    Rejected(String),

    #[error("Identity token is missing email, name or subject")]
    IncompletePayload,

    #[error("Could not load signing keys: {0}")]
    Keys(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError>;
}

/// Where token signing keys come from.
pub enum KeySource {
    /// A JWKS document, fetched on every verification and matched by `kid`.
    Jwks { url: String, http: reqwest::Client },
    /// One fixed key.
    Static { key: DecodingKey, algorithm: Algorithm },
}

impl KeySource {
    pub fn google() -> Self {
        KeySource::Jwks {
            url: GOOGLE_JWKS_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

pub struct GoogleIdentityVerifier {
    client_id: Option<String>,
    keys: KeySource,
}

impl GoogleIdentityVerifier {
    /// Without a client id every call fails with [`IdentityError::NotConfigured`].
    pub fn new(client_id: Option<String>, keys: KeySource) -> Self {
        if client_id.is_none() {
            warn!("GOOGLE_CLIENT_ID not set, Google sign-in is disabled");
        }
        Self { client_id, keys }
    }

    async fn decoding_key(&self, token: &str) -> Result<(DecodingKey, Algorithm), IdentityError> {
        match &self.keys {
            KeySource::Static { key, algorithm } => Ok((key.clone(), *algorithm)),
            KeySource::Jwks { url, http } => {
                let header =
                    decode_header(token).map_err(|e| IdentityError::Rejected(e.to_string()))?;
                let kid = header
                    .kid
                    .ok_or_else(|| IdentityError::Rejected("token header has no kid".into()))?;

                let jwks: JwkSet = http
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| IdentityError::Keys(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| IdentityError::Keys(e.to_string()))?;

                let jwk = jwks
                    .find(&kid)
                    .ok_or_else(|| IdentityError::Rejected(format!("unknown signing key {kid}")))?;
                let key =
                    DecodingKey::from_jwk(jwk).map_err(|e| IdentityError::Keys(e.to_string()))?;
                Ok((key, Algorithm::RS256))
            }
        }
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let Some(client_id) = self.client_id.as_deref() else {
            warn!("Google token received but sign-in is not configured");
            return Err(IdentityError::NotConfigured);
        };

        let (key, algorithm) = self.decoding_key(id_token).await.map_err(|e| {
            warn!(error = %e, "Google token verification failed");
            e
        })?;

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[client_id]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let claims = decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| {
                warn!(error = %e, "Google token verification failed");
                IdentityError::Rejected(e.to_string())
            })?
            .claims;

        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        match (present(claims.email), present(claims.name), present(claims.sub)) {
            (Some(email), Some(name), Some(external_id)) => {
                debug!(email = %email, "Google token verified");
                Ok(VerifiedIdentity {
                    email,
                    name,
                    external_id,
                })
            }
            _ => {
                warn!("Google token payload is incomplete");
                Err(IdentityError::IncompletePayload)
            }
        }
    }
}
