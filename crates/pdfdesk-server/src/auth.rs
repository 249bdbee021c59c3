//! Session middleware and request extractors.
//!
//! [`protect`] and [`admin_only`] wrap a sub-router so that its handlers only
//! run for a valid session. Handlers read the caller with the [`AuthUser`]
//! extractor and never touch tokens themselves.

use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::{self, Next},
    response::Response,
    Router,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use pdfdesk_shared::{extract_session_token, Role, SessionClaims, SessionError};
use pdfdesk_store::StoreError;

use crate::api::AppState;
use crate::error::ServerError;
use crate::rate_limit::client_ip;

/// The authenticated caller, as currently stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    #[serde(rename = "id")]
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Session token carried by a request, from the bearer header or the cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let cookies = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
    extract_session_token(authorization, cookies)
}

/// Validate the access token and load its user. Missing, blocked or
/// unknown users are rejected.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ServerError> {
    let token = session_token(headers).ok_or(SessionError::Missing)?;
    let claims: SessionClaims = state.access_signer.validate(&token)?;
    let user_id = Uuid::parse_str(&claims.user_id).map_err(|_| SessionError::Invalid)?;

    let user = {
        let db = state.db.lock().await;
        match db.get_user(user_id) {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                return Err(ServerError::Unauthorized("User not found".into()));
            }
            Err(e) => return Err(e.into()),
        }
    };

    if user.is_blocked {
        debug!(user = %user.id, "Rejected session of blocked user");
        return Err(ServerError::Unauthorized("Account has been blocked".into()));
    }

    Ok(AuthUser {
        user_id: user.id,
        email: user.email,
        role: user.role,
    })
}

pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let user = authenticate(&state, req.headers()).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Runs after [`require_session`].
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ServerError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ServerError::Unauthorized("Authentication required".into()))?;

    if !user.role.is_admin() {
        return Err(ServerError::Forbidden("Insufficient permissions".into()));
    }

    Ok(next.run(req).await)
}

/// Require a valid session for every route of `router`.
pub fn protect(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_session,
    ))
}

/// Require an admin session for every route of `router`.
pub fn admin_only(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ServerError::Unauthorized("Authentication required".into()))
    }
}

/// Client address and user agent of a request.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let ip = client_ip(
            &parts.headers,
            &parts.extensions,
            &state.config.trusted_proxies,
        )
        .map(|ip| ip.to_string());

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ClientInfo { ip, user_agent })
    }
}
