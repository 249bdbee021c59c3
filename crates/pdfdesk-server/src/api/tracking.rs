use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use pdfdesk_store::{ConversionStatus, FileRecord, LogType, Severity, SystemLog};

use super::{ApiJson, AppState};
use crate::auth::{authenticate, ClientInfo};
use crate::error::ServerError;

const MISSING_FIELDS: &str =
    "Missing required fields: toolType, originalFileName, fileSize, processingLocation";

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/api/track-conversion", post(track_conversion))
}

/// A tracking request after shape validation.
#[derive(Debug)]
struct Conversion {
    tool_type: String,
    original_file_name: String,
    converted_file_name: Option<String>,
    file_size: i64,
    processing_location: String,
    user_id: Option<String>,
    status: ConversionStatus,
}

fn required_str(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn optional_str(body: &Value, key: &str) -> Result<Option<String>, ServerError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(ServerError::Validation(format!("{key} must be a string"))),
    }
}

fn parse_conversion(body: &Value) -> Result<Conversion, ServerError> {
    let tool_type = required_str(body, "toolType");
    let original_file_name = required_str(body, "originalFileName");
    let processing_location = required_str(body, "processingLocation");
    let file_size = body
        .get("fileSize")
        .and_then(Value::as_f64)
        .filter(|size| size.is_finite() && *size > 0.0)
        .map(|size| size.round() as i64);

    let (Some(tool_type), Some(original_file_name), Some(file_size), Some(processing_location)) =
        (tool_type, original_file_name, file_size, processing_location)
    else {
        return Err(ServerError::Validation(MISSING_FIELDS.into()));
    };

    let status = match optional_str(body, "status")? {
        Some(raw) => raw
            .parse::<ConversionStatus>()
            .map_err(|e| ServerError::Validation(e.to_string()))?,
        None => ConversionStatus::default(),
    };

    Ok(Conversion {
        tool_type,
        original_file_name,
        converted_file_name: optional_str(body, "convertedFileName")?,
        file_size,
        processing_location,
        user_id: optional_str(body, "userId")?,
        status,
    })
}

async fn track_conversion(
    State(state): State<AppState>,
    headers: HeaderMap,
    client: ClientInfo,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Value>, ServerError> {
    let conversion = parse_conversion(&body)?;

    // Anonymous tracking is allowed, so a bad session only loses attribution.
    let session_user = authenticate(&state, &headers).await.ok();

    let db = state.db.lock().await;

    let owner = match session_user {
        Some(user) => Some((user.user_id, Some(user.email))),
        None => conversion
            .user_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .and_then(|id| db.get_user(id).ok())
            .map(|user| (user.id, Some(user.email))),
    };
    if owner.is_none() && conversion.user_id.is_some() {
        debug!("track-conversion named an unknown user, recording anonymously");
    }

    let record = FileRecord {
        id: Uuid::new_v4(),
        user_id: owner.as_ref().map(|(id, _)| *id),
        tool_type: conversion.tool_type,
        original_file_name: conversion.original_file_name,
        converted_file_name: conversion.converted_file_name,
        file_size: conversion.file_size,
        status: conversion.status,
        processing_location: conversion.processing_location,
        ip_address: client.ip.clone(),
        user_agent: client.user_agent.clone(),
        created_at: Utc::now(),
    };
    db.insert_file_record(&record)?;

    if let Some((user_id, _)) = &owner {
        db.increment_conversions(*user_id)?;
    }

    if record.status == ConversionStatus::Failed {
        let (user_id, email) = owner.clone().unzip();
        db.insert_log(
            &SystemLog::new(
                LogType::ConversionError,
                Severity::Medium,
                format!("Conversion failed: {}", record.tool_type),
            )
            .with_details(format!(
                "{} ({} bytes)",
                record.original_file_name, record.file_size
            ))
            .with_user(user_id, email.flatten())
            .with_client(client.ip, client.user_agent),
        )?;
    }

    info!(
        tool = %record.tool_type,
        owner = ?record.user_id,
        status = record.status.as_str(),
        "Tracked conversion"
    );

    Ok(Json(json!({
        "success": true,
        "conversionId": record.id,
    })))
}
