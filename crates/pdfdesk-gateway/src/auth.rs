//! Local session check for gateway routes.
//!
//! The gateway has no user store. It only verifies the access token's
//! signature and expiry and leaves freshness checks to the backend.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::{self, Next},
    response::Response,
    Router,
};

use pdfdesk_shared::{extract_session_token, SessionClaims, SessionError};

use crate::api::AppState;
use crate::error::GatewayError;

/// Claims of the validated caller, as carried by the token.
#[derive(Debug, Clone)]
pub struct Caller(pub SessionClaims);

pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let headers = req.headers();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let cookies = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());

    let token = extract_session_token(authorization, cookies).ok_or(SessionError::Missing)?;
    let claims = state.signer.validate(&token)?;

    req.extensions_mut().insert(Caller(claims));
    Ok(next.run(req).await)
}

/// Require a valid session for every route of `router`.
pub fn protect(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_session,
    ))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or_else(|| GatewayError::NotFound("User not found".into()))
    }
}
