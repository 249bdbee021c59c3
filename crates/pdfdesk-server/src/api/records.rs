use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use pdfdesk_store::{ConversionStatus, FileRecordWithOwner};

use super::AppState;
use crate::auth::admin_only;
use crate::error::ServerError;

pub(super) fn routes(state: &AppState) -> Router<AppState> {
    admin_only(
        Router::new().route("/api/file-records", get(list_file_records)),
        state,
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadedBy {
    id: String,
    name: String,
    email: String,
}

/// One row of the file management view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileRecordView {
    id: String,
    filename: String,
    file_type: &'static str,
    original_extension: String,
    uploaded_by: UploadedBy,
    uploaded_at: String,
    status: &'static str,
    file_size: i64,
    download_url: Option<String>,
    error_message: Option<&'static str>,
}

/// Document family a tool works from, for grouping in the UI.
fn file_type_for_tool(tool_type: &str) -> &'static str {
    match tool_type {
        "word-to-pdf" => "Word",
        "excel-to-pdf" => "Excel",
        "powerpoint-to-pdf" => "PowerPoint",
        "jpg-to-pdf" => "Image",
        "pdf-to-word" | "pdf-to-excel" | "pdf-to-powerpoint" | "pdf-to-ppt" | "pdf-to-jpg"
        | "compress-pdf" | "split-pdf" | "merge-pdf" => "PDF",
        _ => "Other",
    }
}

fn extension_of(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => format!(".{}", ext.to_ascii_lowercase()),
        _ => ".unknown".to_string(),
    }
}

impl From<FileRecordWithOwner> for FileRecordView {
    fn from(row: FileRecordWithOwner) -> Self {
        let FileRecordWithOwner { record, owner } = row;

        let uploaded_by = match owner {
            Some(owner) => UploadedBy {
                id: owner.id.to_string(),
                name: owner.name,
                email: owner.email,
            },
            None => UploadedBy {
                id: "anonymous".to_string(),
                name: "Anonymous User".to_string(),
                email: record
                    .ip_address
                    .clone()
                    .unwrap_or_else(|| "Unknown".to_string()),
            },
        };

        FileRecordView {
            id: record.id.to_string(),
            file_type: file_type_for_tool(&record.tool_type),
            original_extension: extension_of(&record.original_file_name),
            filename: record.original_file_name,
            uploaded_by,
            uploaded_at: record.created_at.to_rfc3339(),
            status: record.status.display_label(),
            file_size: record.file_size,
            download_url: record
                .converted_file_name
                .map(|name| format!("/downloads/{name}")),
            error_message: (record.status == ConversionStatus::Failed)
                .then_some("Conversion failed"),
        }
    }
}

async fn list_file_records(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let rows = state.db.lock().await.list_file_records_with_owner()?;
    let records: Vec<FileRecordView> = rows.into_iter().map(FileRecordView::from).collect();

    Ok(Json(json!({
        "success": true,
        "data": records,
    })))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::test_support::get;
    use super::*;
    use axum::http::StatusCode;
    use chrono::Utc;
    use pdfdesk_shared::Role;
    use pdfdesk_store::FileRecord;
    use uuid::Uuid;

    #[test]
    fn extensions_and_file_types() {
        assert_eq!(extension_of("Report.PDF"), ".pdf");
        assert_eq!(extension_of("README"), ".unknown");
        assert_eq!(file_type_for_tool("jpg-to-pdf"), "Image");
        assert_eq!(file_type_for_tool("html-to-pdf"), "Other");
    }

    #[tokio::test]
    async fn file_records_require_admin() {
        let state = state();
        let app = app(&state);
        let user = seed_user(&state, "ada@example.com", Role::User).await;

        let (status, _) = send(&app, get("/api/file-records", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, get("/api/file-records", Some(&token_for(&state, &user)))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Insufficient permissions");
    }

    #[tokio::test]
    async fn anonymous_owner_is_rendered_with_ip() {
        let state = state();
        let admin = seed_user(&state, "root@example.com", Role::Admin).await;
        state
            .db
            .lock()
            .await
            .insert_file_record(&FileRecord {
                id: Uuid::new_v4(),
                user_id: None,
                tool_type: "merge-pdf".into(),
                original_file_name: "a.pdf".into(),
                converted_file_name: Some("a-merged.pdf".into()),
                file_size: 10,
                status: ConversionStatus::Failed,
                processing_location: "server".into(),
                ip_address: Some("198.51.100.4".into()),
                user_agent: None,
                created_at: Utc::now(),
            })
            .unwrap();

        let (status, body) =
            send(&app(&state), get("/api/file-records", Some(&token_for(&state, &admin)))).await;
        assert_eq!(status, StatusCode::OK);

        let row = &body["data"][0];
        assert_eq!(row["uploadedBy"]["id"], "anonymous");
        assert_eq!(row["uploadedBy"]["name"], "Anonymous User");
        assert_eq!(row["uploadedBy"]["email"], "198.51.100.4");
        assert_eq!(row["fileType"], "PDF");
        assert_eq!(row["status"], "Failed");
        assert_eq!(row["errorMessage"], "Conversion failed");
        assert_eq!(row["downloadUrl"], "/downloads/a-merged.pdf");
    }
}
