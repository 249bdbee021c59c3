use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use pdfdesk_shared::Role;
use pdfdesk_store::{LogType, Severity, StoreError, SystemLog, User};

use super::{parse_id, ApiJson, AppState};
use crate::auth::{admin_only, AuthUser, ClientInfo};
use crate::error::ServerError;

pub(super) fn routes(state: &AppState) -> Router<AppState> {
    admin_only(
        Router::new()
            .route("/api/admin/users", get(list_users))
            .route("/api/admin/users/:id/role", patch(update_role))
            .route("/api/admin/users/:id/block", patch(update_blocked)),
        state,
    )
}

fn load_user(db: &pdfdesk_store::Database, raw_id: &str) -> Result<User, ServerError> {
    let id = parse_id(raw_id, "User")?;
    db.get_user(id).map_err(|e| match e {
        StoreError::NotFound => ServerError::NotFound("User not found".into()),
        other => other.into(),
    })
}

fn user_action(actor: &AuthUser, client: ClientInfo, message: String, details: String) -> SystemLog {
    SystemLog::new(LogType::UserAction, Severity::Low, message)
        .with_details(details)
        .with_user(Some(actor.user_id), Some(actor.email.clone()))
        .with_client(client.ip, client.user_agent)
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let users = state.db.lock().await.list_users()?;
    Ok(Json(json!({
        "success": true,
        "data": users,
    })))
}

async fn update_role(
    State(state): State<AppState>,
    actor: AuthUser,
    client: ClientInfo,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>, ServerError> {
    let role: Role = body
        .get("role")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ServerError::Validation("Invalid role".into()))?;

    let db = state.db.lock().await;
    let user = load_user(&db, &id)?;
    db.set_role(user.id, role)?;
    db.insert_log(&user_action(
        &actor,
        client,
        format!("Changed role of {} to {}", user.email, role),
        format!("previous role: {}", user.role),
    ))?;
    let user = db.get_user(user.id)?;
    drop(db);

    info!(admin = %actor.user_id, user = %user.id, role = %role, "Updated user role");

    Ok(Json(json!({
        "success": true,
        "message": "User role updated",
        "data": user,
    })))
}

async fn update_blocked(
    State(state): State<AppState>,
    actor: AuthUser,
    client: ClientInfo,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>, ServerError> {
    let blocked = body
        .get("isBlocked")
        .and_then(Value::as_bool)
        .ok_or_else(|| ServerError::Validation("isBlocked must be a boolean".into()))?;

    let db = state.db.lock().await;
    let user = load_user(&db, &id)?;
    if blocked && user.role.is_admin() {
        return Err(ServerError::Validation("Cannot block an admin user".into()));
    }

    db.set_blocked(user.id, blocked)?;
    let revoked = if blocked {
        db.delete_user_sessions(user.id)?
    } else {
        0
    };
    let verb = if blocked { "Blocked" } else { "Unblocked" };
    db.insert_log(&user_action(
        &actor,
        client,
        format!("{verb} user {}", user.email),
        format!("{revoked} session(s) revoked"),
    ))?;
    let user = db.get_user(user.id)?;
    drop(db);

    info!(admin = %actor.user_id, user = %user.id, blocked, revoked, "Updated user block state");

    Ok(Json(json!({
        "success": true,
        "message": format!("User {}", verb.to_lowercase()),
        "data": user,
    })))
}
