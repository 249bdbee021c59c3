use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use pdfdesk_shared::constants::{DEFAULT_TIME_RANGE, STORAGE_CAPACITY_BYTES};
use pdfdesk_store::TimeWindow;

use super::AppState;
use crate::auth::protect;
use crate::error::ServerError;

pub(super) fn routes(state: &AppState) -> Router<AppState> {
    protect(
        Router::new().route("/api/statistics", get(statistics)),
        state,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatisticsQuery {
    time_range: Option<String>,
}

/// Start of the reporting window ending at `now`. Unknown ranges mean 30 days.
fn window_start(time_range: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    match time_range {
        "7d" => now - Duration::days(7),
        "90d" => now - Duration::days(90),
        "1y" => now
            .checked_sub_months(Months::new(12))
            .unwrap_or(now - Duration::days(365)),
        _ => now - Duration::days(30),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Percent change from `previous` to `current`; 0 when there is no baseline.
fn growth(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous * 100.0
    }
}

fn success_rate(successful: i64, failed: i64) -> f64 {
    let total = successful + failed;
    if total == 0 {
        0.0
    } else {
        successful as f64 / total as f64 * 100.0
    }
}

fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes <= 0 {
        return "0 Bytes".to_string();
    }

    let bytes = bytes as f64;
    let exponent = ((bytes.ln() / 1024f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = round1(bytes / 1024f64.powi(exponent as i32));
    if value.fract() == 0.0 {
        format!("{value:.0} {}", UNITS[exponent])
    } else {
        format!("{value:.1} {}", UNITS[exponent])
    }
}

/// Human-readable name of a tool, or the raw tool id.
fn tool_label(tool_type: &str) -> String {
    match tool_type {
        "pdf-to-jpg" => "PDF to Image",
        "office-to-pdf" => "Office to PDF",
        "pdf-to-word" => "PDF to Word",
        "pdf-to-ppt" => "PDF to PowerPoint",
        "pdf-to-excel" => "PDF to Excel",
        "compress-pdf" => "PDF Compression",
        "split-pdf" => "PDF Split",
        "merge-pdf" => "PDF Merge",
        other => other,
    }
    .to_string()
}

#[derive(Debug, Serialize)]
struct FileTypeShare {
    #[serde(rename = "type")]
    label: String,
    count: i64,
    percentage: f64,
}

async fn statistics(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> Result<Json<Value>, ServerError> {
    let time_range = query.time_range.as_deref().unwrap_or(DEFAULT_TIME_RANGE);
    let now = Utc::now();
    let start = window_start(time_range, now);
    let previous_start = start - (now - start);

    let current = TimeWindow::since(start);
    let previous = TimeWindow::between(previous_start, start);
    let year_ago = Utc
        .with_ymd_and_hms(now.year() - 1, now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now - Duration::days(365));

    let db = state.db.lock().await;

    let total_uploads = db.count_file_records(current)?;
    let previous_uploads = db.count_file_records(previous)?;

    let statuses = db.count_by_status(current)?;
    let previous_statuses = db.count_by_status(previous)?;
    let rate = success_rate(statuses.completed, statuses.failed);
    let previous_rate = success_rate(previous_statuses.completed, previous_statuses.failed);

    let total_bytes = db.total_file_size(TimeWindow::all())?;
    let previous_bytes = db.total_file_size(previous)?;
    let storage_percentage = (total_bytes as f64 / STORAGE_CAPACITY_BYTES as f64 * 100.0).min(100.0);

    let all_file_types: Vec<FileTypeShare> = db
        .count_by_tool_type(current)?
        .into_iter()
        .map(|(tool_type, count)| FileTypeShare {
            label: tool_label(&tool_type),
            count,
            percentage: if total_uploads == 0 {
                0.0
            } else {
                round1(count as f64 / total_uploads as f64 * 100.0)
            },
        })
        .collect();

    let daily_uploads: Vec<Value> = db
        .daily_counts(start, 30)?
        .into_iter()
        .map(|(date, count)| json!({ "date": date, "count": count }))
        .collect();

    let monthly_uploads: Vec<Value> = db
        .monthly_counts(year_ago, 12)?
        .into_iter()
        .map(|(month, count)| json!({ "month": month, "count": count }))
        .collect();

    drop(db);

    let most_uploaded = all_file_types
        .first()
        .map(|share| json!(share))
        .unwrap_or_else(|| json!({ "type": "N/A", "count": 0, "percentage": 0.0 }));

    Ok(Json(json!({
        "success": true,
        "data": {
            "dailyUploads": daily_uploads,
            "monthlyUploads": monthly_uploads,
            "mostUploadedFileType": most_uploaded,
            "allFileTypes": all_file_types,
            "conversionSuccessRate": {
                "successful": statuses.completed,
                "failed": statuses.failed,
                "rate": round1(rate),
            },
            "totalStorageUsed": {
                "bytes": total_bytes,
                "formatted": format_bytes(total_bytes),
                "percentage": round1(storage_percentage),
            },
            "growthRates": {
                "uploads": round1(growth(total_uploads as f64, previous_uploads as f64)),
                "successRate": round1(growth(rate, previous_rate)),
                "failures": round1(growth(statuses.failed as f64, previous_statuses.failed as f64)),
                "storage": round1(growth(total_bytes as f64, previous_bytes as f64)),
            },
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::test_support::get;
    use super::*;
    use axum::http::StatusCode;
    use pdfdesk_shared::Role;
    use pdfdesk_store::{ConversionStatus, FileRecord};
    use uuid::Uuid;

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5 GB");
    }

    #[test]
    fn growth_and_rates() {
        assert_eq!(growth(10.0, 0.0), 0.0);
        assert_eq!(growth(15.0, 10.0), 50.0);
        assert_eq!(round1(growth(2.0, 3.0)), -33.3);
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(round1(success_rate(2, 1)), 66.7);
    }

    #[test]
    fn time_ranges() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(window_start("7d", now), now - Duration::days(7));
        assert_eq!(window_start("90d", now), now - Duration::days(90));
        assert_eq!(
            window_start("1y", now),
            Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
        );
        assert_eq!(window_start("forever", now), now - Duration::days(30));
    }

    #[tokio::test]
    async fn statistics_require_a_session() {
        let state = state();
        let (status, _) = send(&app(&state), get("/api/statistics", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn statistics_summarise_recent_conversions() {
        let state = state();
        let user = seed_user(&state, "ada@example.com", Role::User).await;
        {
            let db = state.db.lock().await;
            for (tool, status, size) in [
                ("pdf-to-word", ConversionStatus::Completed, 1024),
                ("pdf-to-word", ConversionStatus::Completed, 1024),
                ("merge-pdf", ConversionStatus::Failed, 1024),
            ] {
                db.insert_file_record(&FileRecord {
                    id: Uuid::new_v4(),
                    user_id: None,
                    tool_type: tool.into(),
                    original_file_name: "x.pdf".into(),
                    converted_file_name: None,
                    file_size: size,
                    status,
                    processing_location: "client".into(),
                    ip_address: None,
                    user_agent: None,
                    created_at: Utc::now(),
                })
                .unwrap();
            }
        }

        let (status, body) = send(
            &app(&state),
            get("/api/statistics?timeRange=7d", Some(&token_for(&state, &user))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let data = &body["data"];
        assert_eq!(data["mostUploadedFileType"]["type"], "PDF to Word");
        assert_eq!(data["mostUploadedFileType"]["count"], 2);
        assert_eq!(data["mostUploadedFileType"]["percentage"], 66.7);
        assert_eq!(data["allFileTypes"].as_array().unwrap().len(), 2);
        assert_eq!(data["conversionSuccessRate"]["successful"], 2);
        assert_eq!(data["conversionSuccessRate"]["failed"], 1);
        assert_eq!(data["conversionSuccessRate"]["rate"], 66.7);
        assert_eq!(data["totalStorageUsed"]["bytes"], 3072);
        assert_eq!(data["totalStorageUsed"]["formatted"], "3 KB");
        assert_eq!(data["growthRates"]["uploads"], 0.0);
        assert_eq!(data["monthlyUploads"][0]["count"], 3);
    }
}
