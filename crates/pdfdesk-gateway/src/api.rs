use std::any::Any;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection, DefaultBodyLimit, Multipart, Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use pdfdesk_shared::constants::DEFAULT_TIME_RANGE;
use pdfdesk_shared::SessionSigner;

use crate::auth::{protect, Caller};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::pdf::{self, PdfError};
use crate::proxy::{Backend, Outbound};

const MISSING_FIELDS: &str = "Missing required fields";

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
    pub signer: Arc<SessionSigner>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            backend: Arc::new(Backend::new(config.backend_url.clone())),
            // Validation only; the lifetime is unused.
            signer: Arc::new(SessionSigner::new(
                &config.jwt_secret,
                chrono::Duration::seconds(pdfdesk_shared::constants::ACCESS_TOKEN_TTL_SECS),
            )),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = protect(Router::new().route("/api/auth/me", get(me)), &state);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/file-records", get(file_records))
        .route("/api/statistics", get(statistics))
        .route("/api/track-conversion", post(track_conversion))
        .route("/api/pdf-info", post(pdf_info))
        .merge(protected)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response {
    GatewayError::Internal("handler panicked".into()).into_response()
}

async fn not_found() -> GatewayError {
    GatewayError::NotFound("Route not found".into())
}

async fn me(Caller(claims): Caller) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "user": {
                "id": claims.user_id,
                "email": claims.email,
                "role": claims.role,
            },
        },
    }))
}

// ---------------------------------------------------------------------------
// Auth relays
// ---------------------------------------------------------------------------

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let relayed = state
        .backend
        .relay(Outbound::post("/api/auth/login", body), &headers, "Failed to log in")
        .await?;
    Ok(relayed.into_response(true))
}

async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let relayed = state
        .backend
        .relay(
            Outbound::post("/api/auth/refresh-token", Bytes::from_static(b"{}")),
            &headers,
            "Failed to refresh session",
        )
        .await?;
    Ok(relayed.into_response(true))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let relayed = state
        .backend
        .relay(
            Outbound::post("/api/auth/logout", Bytes::from_static(b"{}")),
            &headers,
            "Failed to log out",
        )
        .await?;
    Ok(relayed.into_response(true))
}

// ---------------------------------------------------------------------------
// Data relays
// ---------------------------------------------------------------------------

async fn file_records(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let relayed = state
        .backend
        .relay(
            Outbound::get("/api/file-records"),
            &headers,
            "Failed to fetch file records",
        )
        .await?;
    Ok(relayed.into_response(false))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatisticsQuery {
    time_range: Option<String>,
}

async fn statistics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StatisticsQuery>,
) -> Result<Response, GatewayError> {
    let time_range = query
        .time_range
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_TIME_RANGE.to_string());
    let params = [("timeRange", time_range.as_str())];

    let relayed = state
        .backend
        .relay(
            Outbound::get("/api/statistics").with_query(&params),
            &headers,
            "Failed to fetch statistics",
        )
        .await?;
    Ok(relayed.into_response(false))
}

/// Check the tracking payload and drop an empty `userId` so the backend
/// falls back to the session owner.
fn prepare_tracking_body(body: &[u8]) -> Result<Value, GatewayError> {
    let mut body: Value = serde_json::from_slice(body)
        .map_err(|_| GatewayError::Validation("Invalid JSON body".into()))?;
    let object = body
        .as_object_mut()
        .ok_or_else(|| GatewayError::Validation(MISSING_FIELDS.into()))?;

    let non_empty = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    };
    let positive_size = object
        .get("fileSize")
        .and_then(Value::as_f64)
        .is_some_and(|n| n.is_finite() && n > 0.0);

    if !(non_empty("toolType")
        && non_empty("originalFileName")
        && non_empty("processingLocation")
        && positive_size)
    {
        return Err(GatewayError::Validation(MISSING_FIELDS.into()));
    }

    let empty_user = match object.get("userId") {
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Null) => true,
        _ => false,
    };
    if empty_user {
        object.remove("userId");
    }

    Ok(body)
}

async fn track_conversion(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let payload = prepare_tracking_body(&body)?;
    let payload = serde_json::to_vec(&payload)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    let relayed = state
        .backend
        .relay(
            Outbound::post("/api/track-conversion", Bytes::from(payload)),
            &headers,
            "Failed to track conversion",
        )
        .await?;
    Ok(relayed.into_response(false))
}

// ---------------------------------------------------------------------------
// PDF inspection
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PdfInfoResponse {
    success: bool,
    page_count: usize,
    file_name: String,
    file_size: usize,
}

async fn pdf_info(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PdfInfoResponse>, GatewayError> {
    let unreadable = |e: &dyn std::fmt::Display| {
        warn!(error = %e, "Could not read PDF upload");
        GatewayError::Processing("Failed to process PDF file")
    };

    let mut multipart = multipart.map_err(|e| unreadable(&e))?;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| unreadable(&e))? {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(|e| unreadable(&e))?;
            upload = Some((file_name, data));
            break;
        }
    }

    let Some((file_name, data)) = upload else {
        return Err(GatewayError::Validation("PDF file is required".into()));
    };
    if !pdf::has_pdf_extension(&file_name) {
        return Err(GatewayError::Validation(
            "Only PDF files are supported".into(),
        ));
    }

    let page_count = pdf::count_uploaded_pages(data.clone())
        .await
        .map_err(|e| match e {
            PdfError::Task(e) => unreadable(&e),
            other => {
                info!(file = %file_name, error = %other, "Rejected unreadable PDF");
                GatewayError::Validation("Invalid PDF file or file is corrupted".into())
            }
        })?;

    Ok(Json(PdfInfoResponse {
        success: true,
        page_count,
        file_name,
        file_size: data.len(),
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting gateway");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use pdfdesk_shared::{Role, SessionClaims};
    use tower::ServiceExt;

    use crate::pdf::tests::{overflowing_xref_pdf, sample_pdf};

    const SECRET: &str = "gateway-test-secret";

    fn gateway(backend_url: &str) -> (AppState, Router) {
        let state = AppState::new(GatewayConfig {
            backend_url: backend_url.to_string(),
            jwt_secret: SECRET.to_string(),
            ..GatewayConfig::default()
        });
        (state.clone(), build_router(state))
    }

    /// An address nothing listens on.
    async fn closed_backend() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    /// A backend that echoes what it received.
    async fn echo_backend() -> String {
        async fn echo(headers: HeaderMap, uri: axum::http::Uri, body: Bytes) -> Response {
            let get_header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let mut response = axum::response::IntoResponse::into_response((
                StatusCode::ACCEPTED,
                Json(json!({
                    "path": uri.path(),
                    "query": uri.query(),
                    "authorization": get_header("authorization"),
                    "cookie": get_header("cookie"),
                    "forwardedFor": get_header("x-forwarded-for"),
                    "userAgent": get_header("user-agent"),
                    "body": body,
                })),
            ));
            response
                .headers_mut()
                .append(header::SET_COOKIE, "accessToken=a; Path=/".parse().unwrap());
            response
                .headers_mut()
                .append(header::SET_COOKIE, "refreshToken=r; Path=/".parse().unwrap());
            response
        }

        async fn not_json() -> &'static str {
            "<html>oops</html>"
        }

        let app = Router::new()
            .route("/api/file-records", get(not_json))
            .fallback(echo);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart(field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        let boundary = "pdfdesk-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/pdf-info")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn tracking_body() -> Value {
        json!({
            "toolType": "pdf-to-word",
            "originalFileName": "report.pdf",
            "fileSize": 1024,
            "processingLocation": "client",
            "userId": "",
        })
    }

    #[tokio::test]
    async fn me_requires_a_valid_session() {
        let (state, app) = gateway(&closed_backend().await);

        let (status, _, body) = send(
            &app,
            Request::builder().uri("/api/auth/me").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let token = state
            .signer
            .issue(&SessionClaims::new("u1", "a@b.com", Role::User))
            .unwrap();
        let (status, _, body) = send(
            &app,
            Request::builder()
                .uri("/api/auth/me")
                .header("cookie", format!("accessToken={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["id"], "u1");
        assert_eq!(body["data"]["user"]["email"], "a@b.com");
        assert_eq!(body["data"]["user"]["role"], "user");
    }

    #[tokio::test]
    async fn token_from_another_secret_is_rejected() {
        let (_, app) = gateway(&closed_backend().await);
        let foreign = SessionSigner::new("other-secret", chrono::Duration::minutes(15))
            .issue(&SessionClaims::new("u1", "a@b.com", Role::Admin))
            .unwrap();

        let (status, _, _) = send(
            &app,
            Request::builder()
                .uri("/api/auth/me")
                .header("authorization", format!("Bearer {foreign}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_json_500() {
        let (_, app) = gateway(&closed_backend().await);
        let (status, _, body) = send(
            &app,
            Request::builder().uri("/api/statistics").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "success": false, "error": "Failed to fetch statistics" }));
    }

    #[tokio::test]
    async fn non_json_backend_reply_is_a_json_500() {
        let (_, app) = gateway(&echo_backend().await);
        let (status, _, body) = send(
            &app,
            Request::builder().uri("/api/file-records").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch file records");
    }

    #[tokio::test]
    async fn statistics_forwards_headers_and_default_range() {
        let (_, app) = gateway(&echo_backend().await);
        let (status, headers, body) = send(
            &app,
            Request::builder()
                .uri("/api/statistics")
                .header("cookie", "accessToken=abc")
                .header("user-agent", "test-agent")
                .header("x-forwarded-for", "203.0.113.7")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["path"], "/api/statistics");
        assert_eq!(body["query"], "timeRange=30d");
        assert_eq!(body["cookie"], "accessToken=abc");
        assert_eq!(body["userAgent"], "test-agent");
        assert_eq!(body["forwardedFor"], "203.0.113.7");
        assert_eq!(body["authorization"], Value::Null);
        assert!(headers.get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn login_relays_cookies() {
        let (_, app) = gateway(&echo_backend().await);
        let (status, headers, body) = send(
            &app,
            post_json("/api/auth/login", json!({ "email": "a@b.com", "password": "pw" })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["body"]["email"], "a@b.com");
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[tokio::test]
    async fn refresh_targets_backend_refresh_route() {
        let (_, app) = gateway(&echo_backend().await);
        let (_, headers, body) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/api/auth/refresh")
                .header("cookie", "refreshToken=r")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(body["path"], "/api/auth/refresh-token");
        assert_eq!(body["cookie"], "refreshToken=r");
        assert_eq!(headers.get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[tokio::test]
    async fn tracking_is_validated_before_forwarding() {
        // The backend is unreachable, so a 400 proves no call was attempted.
        let (_, app) = gateway(&closed_backend().await);

        for (field, value) in [
            ("toolType", Value::Null),
            ("originalFileName", json!("")),
            ("fileSize", json!("1024")),
            ("fileSize", json!(0)),
            ("processingLocation", json!(7)),
        ] {
            let mut body = tracking_body();
            body[field] = value;
            let (status, _, response) = send(&app, post_json("/api/track-conversion", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{field}");
            assert_eq!(response["error"], MISSING_FIELDS);
        }
    }

    #[tokio::test]
    async fn tracking_forwards_the_cleaned_body() {
        let (_, app) = gateway(&echo_backend().await);
        let (status, _, body) = send(
            &app,
            post_json("/api/track-conversion", tracking_body()),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["body"]["toolType"], "pdf-to-word");
        assert!(body["body"].get("userId").is_none());
    }

    #[tokio::test]
    async fn pdf_info_counts_pages() {
        let (_, app) = gateway(&closed_backend().await);
        let pdf = sample_pdf(3);

        let (status, _, body) = send(&app, multipart("file", "a.pdf", &pdf)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "success": true,
                "pageCount": 3,
                "fileName": "a.pdf",
                "fileSize": pdf.len(),
            })
        );
    }

    #[tokio::test]
    async fn pdf_info_rejects_bad_uploads() {
        let (_, app) = gateway(&closed_backend().await);

        let (status, _, body) = send(&app, multipart("file", "report.docx", b"PK\x03\x04")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "success": false, "error": "Only PDF files are supported" }));

        let (status, _, body) = send(&app, multipart("file", "broken.pdf", b"%PDF-1.5 truncated")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid PDF file or file is corrupted");

        let (status, _, body) =
            send(&app, multipart("file", "crafted.pdf", &overflowing_xref_pdf())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({ "success": false, "error": "Invalid PDF file or file is corrupted" })
        );

        let (status, _, body) = send(&app, multipart("attachment", "a.pdf", &sample_pdf(1))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "PDF file is required");

        let (status, _, body) = send(
            &app,
            post_json("/api/pdf-info", json!({ "file": "a.pdf" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to process PDF file");
    }
}
