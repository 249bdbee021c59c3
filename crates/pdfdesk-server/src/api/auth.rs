use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, StatusCode},
    middleware,
    response::AppendHeaders,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use pdfdesk_shared::constants::REFRESH_TOKEN_COOKIE;
use pdfdesk_shared::passwords::{hash_password, password_policy_violation, verify_password};
use pdfdesk_shared::session::find_cookie;
use pdfdesk_shared::{Role, SessionClaims};
use pdfdesk_store::{LogType, NewUser, Provider, Severity, StoreError, SystemLog, User};

use super::{ApiJson, AppState};
use crate::auth::{protect, AuthUser, ClientInfo};
use crate::cookies;
use crate::error::ServerError;
use crate::rate_limit::rate_limit_middleware;

const BLOCKED_MESSAGE: &str = "Your account has been blocked. Please contact support.";

type SessionCookies = AppendHeaders<[(HeaderName, String); 2]>;

pub(super) fn routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/google", post(google_login))
        .route("/api/auth/refresh-token", post(refresh_token))
        .route_layer(middleware::from_fn_with_state(
            state.auth_rate_limiter.clone(),
            rate_limit_middleware,
        ));

    let protected = protect(
        Router::new()
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/me", get(me))
            .route("/api/auth/verify", get(verify)),
        state,
    );

    public.merge(protected)
}

#[derive(Deserialize)]
struct SignupRequest {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleLoginRequest {
    id_token: Option<String>,
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

fn user_summary(user: &User) -> Value {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "role": user.role,
        "createdAt": user.created_at,
    })
}

fn hash_token(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

/// Issue an access/refresh pair and record the refresh session.
async fn start_session(state: &AppState, user: &User) -> Result<SessionCookies, ServerError> {
    let claims = SessionClaims::new(user.id.to_string(), user.email.clone(), user.role);
    let access_token = state.access_signer.issue(&claims)?;
    let refresh_token = state.refresh_signer.issue(&claims)?;
    let expires_at = Utc::now() + state.refresh_signer.ttl();

    state
        .db
        .lock()
        .await
        .create_session(user.id, &hash_token(&refresh_token), expires_at)?;

    Ok(cookies::session_cookies(
        &access_token,
        state.access_signer.ttl().num_seconds(),
        &refresh_token,
        state.refresh_signer.ttl().num_seconds(),
        state.config.cookie_secure,
    ))
}

async fn record_event(state: &AppState, log: SystemLog) {
    if let Err(e) = state.db.lock().await.insert_log(&log) {
        warn!(error = %e, "Failed to write system log");
    }
}

async fn signup(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<Value>), ServerError> {
    let name = req.name.as_deref().map(str::trim).unwrap_or_default();
    let email = req.email.as_deref().map(str::trim).unwrap_or_default();
    let password = req.password.unwrap_or_default();

    let name_len = name.chars().count();
    if !(2..=50).contains(&name_len) {
        return Err(ServerError::Validation(
            "Name must be between 2 and 50 characters".into(),
        ));
    }
    if !is_valid_email(email) {
        return Err(ServerError::Validation(
            "Please provide a valid email address".into(),
        ));
    }
    if let Some(reason) = password_policy_violation(&password) {
        return Err(ServerError::Validation(reason.into()));
    }

    let role = if state.config.is_admin_email(email) {
        Role::Admin
    } else {
        Role::User
    };
    let password_hash = hash_password(&password)?;

    let db = state.db.lock().await;
    if db.find_user_by_email(email)?.is_some() {
        return Err(ServerError::Conflict(
            "User with this email already exists".into(),
        ));
    }

    let user = db
        .create_user(&NewUser {
            name: name.to_string(),
            email: email.to_string(),
            role,
            password_hash: Some(password_hash),
            google_id: None,
            provider: Provider::Email,
        })
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                ServerError::Conflict("User with this email already exists".into())
            }
            other => other.into(),
        })?;

    info!(user = %user.id, role = %user.role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "User created successfully",
            "data": { "user": user_summary(&user) },
        })),
    ))
}

async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<(SessionCookies, Json<Value>), ServerError> {
    let (Some(email), Some(password)) = (
        req.email.as_deref().map(str::trim).filter(|e| !e.is_empty()),
        req.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ServerError::Validation(
            "Email and password are required".into(),
        ));
    };

    let user = state.db.lock().await.find_user_by_email(email)?;

    let user = match user {
        Some(user)
            if user
                .password_hash
                .as_deref()
                .is_some_and(|hash| verify_password(&password, hash)) =>
        {
            user
        }
        other => {
            let reason = if other.is_some() {
                "wrong password"
            } else {
                "unknown email"
            };
            warn!(reason, "Failed login attempt");
            record_event(
                &state,
                SystemLog::new(LogType::LoginFailure, Severity::Medium, "Failed login attempt")
                    .with_details(reason)
                    .with_user(other.map(|u| u.id), Some(email.to_string()))
                    .with_client(client.ip, client.user_agent),
            )
            .await;
            return Err(ServerError::Unauthorized("Invalid credentials".into()));
        }
    };

    if user.is_blocked {
        return Err(ServerError::Forbidden(BLOCKED_MESSAGE.into()));
    }

    let cookies = start_session(&state, &user).await?;
    state.db.lock().await.record_login(user.id, Utc::now())?;
    info!(user = %user.id, "User logged in");

    Ok((
        cookies,
        Json(json!({
            "success": true,
            "message": "Login successful",
            "data": { "user": user_summary(&user) },
        })),
    ))
}

async fn google_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GoogleLoginRequest>,
) -> Result<(SessionCookies, Json<Value>), ServerError> {
    let id_token = req
        .id_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ServerError::Validation("Google ID token is required".into()))?;

    let identity = state
        .identity
        .verify(&id_token)
        .await
        .map_err(|_| ServerError::Unauthorized("Invalid Google token".into()))?;

    let user = {
        let db = state.db.lock().await;
        match db.find_user_by_email(&identity.email)? {
            None => {
                let role = if state.config.is_admin_email(&identity.email) {
                    Role::Admin
                } else {
                    Role::User
                };
                let user = db.create_user(&NewUser {
                    name: identity.name.clone(),
                    email: identity.email.clone(),
                    role,
                    password_hash: None,
                    google_id: Some(identity.external_id.clone()),
                    provider: Provider::Google,
                })?;
                info!(user = %user.id, "User registered with Google");
                user
            }
            Some(user) if user.google_id.is_none() => {
                db.link_google_id(user.id, &identity.external_id)?;
                info!(user = %user.id, "Linked Google account");
                db.get_user(user.id)?
            }
            Some(user) => user,
        }
    };

    if user.is_blocked {
        return Err(ServerError::Forbidden(BLOCKED_MESSAGE.into()));
    }

    let cookies = start_session(&state, &user).await?;
    state.db.lock().await.record_login(user.id, Utc::now())?;

    Ok((
        cookies,
        Json(json!({
            "success": true,
            "message": "Google login successful",
            "data": { "user": user_summary(&user) },
        })),
    ))
}

fn refresh_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| find_cookie(cookies, REFRESH_TOKEN_COOKIE))
}

async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(SessionCookies, Json<Value>), ServerError> {
    let token = refresh_cookie(&headers)
        .ok_or_else(|| ServerError::Unauthorized("Refresh token not found".into()))?;

    let claims = state
        .refresh_signer
        .validate(&token)
        .map_err(|e| ServerError::Unauthorized(e.refresh_message().into()))?;

    let user = {
        let db = state.db.lock().await;
        let session = db
            .find_session(&hash_token(&token))?
            .filter(|s| s.user_id.to_string() == claims.user_id);

        let session = match session {
            Some(s) if !s.is_expired(Utc::now()) => s,
            Some(expired) => {
                db.delete_session(expired.id)?;
                return Err(ServerError::Unauthorized(
                    "Invalid or expired refresh token".into(),
                ));
            }
            None => {
                return Err(ServerError::Unauthorized(
                    "Invalid or expired refresh token".into(),
                ));
            }
        };

        let user = match db.get_user(session.user_id) {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                return Err(ServerError::Unauthorized("User not found".into()));
            }
            Err(e) => return Err(e.into()),
        };

        db.delete_session(session.id)?;
        user
    };

    if user.is_blocked {
        return Err(ServerError::Forbidden(BLOCKED_MESSAGE.into()));
    }

    let cookies = start_session(&state, &user).await?;

    Ok((
        cookies,
        Json(json!({
            "success": true,
            "message": "Tokens refreshed successfully",
        })),
    ))
}

async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<(SessionCookies, Json<Value>), ServerError> {
    {
        let db = state.db.lock().await;
        let presented = match refresh_cookie(&headers) {
            Some(token) => db.find_session(&hash_token(&token))?,
            None => None,
        };
        match presented {
            Some(session) if session.user_id == user.user_id => {
                db.delete_session(session.id)?;
            }
            _ => {
                db.delete_user_sessions(user.user_id)?;
            }
        }
    }

    info!(user = %user.user_id, "User logged out");

    Ok((
        cookies::cleared_session_cookies(state.config.cookie_secure),
        Json(json!({
            "success": true,
            "message": "Logout successful",
        })),
    ))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ServerError> {
    let profile = state
        .db
        .lock()
        .await
        .get_user(user.user_id)
        .map_err(|e| match e {
            StoreError::NotFound => ServerError::NotFound("User not found".into()),
            other => other.into(),
        })?;

    Ok(Json(json!({
        "success": true,
        "data": { "user": profile },
    })))
}

async fn verify(user: AuthUser) -> Json<Value> {
    Json(json!({
        "success": true,
        "user": user,
    }))
}
