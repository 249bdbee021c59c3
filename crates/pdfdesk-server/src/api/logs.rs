//! System-log administration: filtered listing, aggregate stats and deletion.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use pdfdesk_store::{LogFilter, LogType, Severity, StoreError};

use super::{parse_id, ApiJson, AppState};
use crate::auth::{admin_only, AuthUser};
use crate::error::ServerError;

pub(super) fn routes(state: &AppState) -> Router<AppState> {
    admin_only(
        Router::new()
            .route("/api/admin/logs", get(list_logs).delete(delete_many))
            .route("/api/admin/logs/stats", get(log_stats))
            .route("/api/admin/logs/:id", get(get_log).delete(delete_one)),
        state,
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogQuery {
    #[serde(rename = "type")]
    log_type: Option<String>,
    severity: Option<String>,
    search: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

/// `None` for an absent, empty or `all` filter value.
fn active(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

fn parse_count(raw: Option<&str>, name: &str, default: u32) -> Result<u32, ServerError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ServerError::Validation(format!("{name} must be a non-negative integer"))),
    }
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC).
fn parse_date(raw: &str, name: &str) -> Result<DateTime<Utc>, ServerError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ServerError::Validation(format!("{name} is not a valid date")))
}

impl LogQuery {
    fn into_filter(self) -> Result<LogFilter, ServerError> {
        let log_type = active(self.log_type.as_deref())
            .map(str::parse::<LogType>)
            .transpose()
            .map_err(|e| ServerError::Validation(e.to_string()))?;
        let severity = active(self.severity.as_deref())
            .map(str::parse::<Severity>)
            .transpose()
            .map_err(|e| ServerError::Validation(e.to_string()))?;

        Ok(LogFilter {
            log_type,
            severity,
            search: self
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            start: active(self.start_date.as_deref())
                .map(|d| parse_date(d, "startDate"))
                .transpose()?,
            end: active(self.end_date.as_deref())
                .map(|d| parse_date(d, "endDate"))
                .transpose()?,
            limit: parse_count(self.limit.as_deref(), "limit", 50)?,
            offset: parse_count(self.offset.as_deref(), "offset", 0)?,
        })
    }
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, ServerError> {
    let filter = query.into_filter()?;
    let (logs, total) = state.db.lock().await.query_logs(&filter)?;
    let has_more = i64::from(filter.offset) + i64::from(filter.limit) < total;

    Ok(Json(json!({
        "success": true,
        "data": {
            "logs": logs,
            "total": total,
            "hasMore": has_more,
        },
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsQuery {
    time_range: Option<String>,
}

fn stats_window(time_range: &str) -> Duration {
    match time_range {
        "1d" => Duration::days(1),
        "30d" => Duration::days(30),
        "90d" => Duration::days(90),
        _ => Duration::days(7),
    }
}

async fn log_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, ServerError> {
    let from = Utc::now() - stats_window(query.time_range.as_deref().unwrap_or("7d"));

    let db = state.db.lock().await;
    let by_severity = db.log_counts_by_severity(from)?;
    let by_type = db.log_counts_by_type(from)?;
    let daily = db.daily_log_counts(from, 30)?;
    drop(db);

    let total: i64 = by_severity.values().sum();
    let severity_counts: Map<String, Value> = Severity::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), json!(by_severity.get(s).copied().unwrap_or(0))))
        .collect();
    let type_counts: Map<String, Value> = LogType::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), json!(by_type.get(t).copied().unwrap_or(0))))
        .collect();
    let daily_logs: Vec<Value> = daily
        .into_iter()
        .map(|(date, count)| json!({ "date": date, "count": count }))
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "severityCounts": severity_counts,
            "typeCounts": type_counts,
            "dailyLogs": daily_logs,
            "totalLogs": total,
        },
    })))
}

fn log_not_found(e: StoreError) -> ServerError {
    match e {
        StoreError::NotFound => ServerError::NotFound("Log not found".into()),
        other => other.into(),
    }
}

async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let id = parse_id(&id, "Log")?;
    let log = state.db.lock().await.get_log(id).map_err(log_not_found)?;
    Ok(Json(json!({ "success": true, "data": log })))
}

async fn delete_one(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let id = parse_id(&id, "Log")?;
    if !state.db.lock().await.delete_log(id)? {
        return Err(ServerError::NotFound("Log not found".into()));
    }

    info!(admin = %actor.user_id, log = %id, "Deleted system log");
    Ok(Json(json!({
        "success": true,
        "message": "Log deleted successfully",
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteLogsRequest {
    #[serde(default)]
    log_ids: Vec<String>,
}

async fn delete_many(
    State(state): State<AppState>,
    actor: AuthUser,
    ApiJson(req): ApiJson<DeleteLogsRequest>,
) -> Result<Json<Value>, ServerError> {
    if req.log_ids.is_empty() {
        return Err(ServerError::Validation(
            "logIds must be a non-empty array".into(),
        ));
    }

    // Ids that are not UUIDs cannot match a row.
    let ids: Vec<Uuid> = req
        .log_ids
        .iter()
        .filter_map(|raw| Uuid::parse_str(raw).ok())
        .collect();
    let deleted = state.db.lock().await.delete_logs(&ids)?;

    info!(admin = %actor.user_id, deleted, "Deleted system logs");
    Ok(Json(json!({
        "success": true,
        "message": format!("{deleted} logs deleted successfully"),
        "deletedCount": deleted,
    })))
}
