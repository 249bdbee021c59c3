//! HTTP API of the backend.
//!
//! Every response body is JSON. Failures render as
//! `{"success": false, "error": "..."}` through [`ServerError`].

mod auth;
mod health;
mod logs;
mod records;
mod statistics;
mod tracking;
mod users;

use std::any::Any;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, Request},
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use pdfdesk_shared::SessionSigner;
use pdfdesk_store::Database;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::identity::IdentityVerifier;
use crate::rate_limit::{rate_limit_middleware, Quota, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub access_signer: Arc<SessionSigner>,
    pub refresh_signer: Arc<SessionSigner>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub rate_limiter: RateLimiter,
    pub auth_rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, db: Database, identity: Arc<dyn IdentityVerifier>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            access_signer: Arc::new(SessionSigner::new(&config.jwt_secret, config.access_ttl)),
            refresh_signer: Arc::new(SessionSigner::new(
                &config.jwt_refresh_secret,
                config.refresh_ttl,
            )),
            identity,
            rate_limiter: RateLimiter::new(
                Quota {
                    per_second: config.rate_limit_per_sec,
                    burst: config.rate_limit_burst,
                },
                &config.trusted_proxies,
            ),
            auth_rate_limiter: RateLimiter::new(Quota::SIGN_IN, &config.trusted_proxies),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes(&state))
        .merge(tracking::routes())
        .merge(records::routes(&state))
        .merge(statistics::routes(&state))
        .merge(users::routes(&state))
        .merge(logs::routes(&state))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors_layer(&state.config))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true);

    match config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            warn!(origin = %config.frontend_url, "FRONTEND_URL is not a valid origin, CORS disabled");
            layer
        }
    }
}

fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response {
    ServerError::Internal("handler panicked".into()).into_response()
}

async fn not_found() -> ServerError {
    ServerError::NotFound("Route not found".into())
}

/// JSON body extractor whose rejection is a [`ServerError`].
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(|rejection: JsonRejection| ServerError::Validation(rejection.body_text()))
    }
}

/// Parse an id path segment; anything that is not a UUID cannot exist.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw).map_err(|_| ServerError::NotFound(format!("{what} not found")))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use pdfdesk_shared::passwords::hash_password;
    use pdfdesk_shared::{Role, SessionClaims};
    use pdfdesk_store::{Database, NewUser, Provider, User};
    use tower::ServiceExt;

    use super::{build_router, AppState};
    use crate::config::ServerConfig;
    use crate::identity::tests::{static_verifier, TEST_CLIENT_ID};

    pub const PASSWORD: &str = "password123";

    pub fn state() -> AppState {
        state_with(ServerConfig::default())
    }

    pub fn state_with(config: ServerConfig) -> AppState {
        let config = ServerConfig {
            google_client_id: Some(TEST_CLIENT_ID.to_string()),
            admin_emails: vec!["boss@example.com".to_string()],
            ..config
        };
        AppState::new(
            config,
            Database::open_in_memory().unwrap(),
            Arc::new(static_verifier(Some(TEST_CLIENT_ID))),
        )
    }

    pub fn app(state: &AppState) -> Router {
        build_router(state.clone())
    }

    pub async fn seed_user(state: &AppState, email: &str, role: Role) -> User {
        let db = state.db.lock().await;
        db.create_user(&NewUser {
            name: "Seeded User".into(),
            email: email.into(),
            role,
            password_hash: Some(hash_password(PASSWORD).unwrap()),
            google_id: None,
            provider: Provider::Email,
        })
        .unwrap()
    }

    pub fn token_for(state: &AppState, user: &User) -> String {
        state
            .access_signer
            .issue_at(
                &SessionClaims::new(user.id.to_string(), user.email.clone(), user.role),
                Utc::now(),
            )
            .unwrap()
    }

    pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    pub fn json(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }
}
