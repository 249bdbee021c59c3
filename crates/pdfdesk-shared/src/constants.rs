/// Application name
pub const APP_NAME: &str = "pdfdesk";

/// `iss` claim of every session token
pub const TOKEN_ISSUER: &str = "pdfdesk-api";

/// `aud` claim of every session token
pub const TOKEN_AUDIENCE: &str = "pdfdesk-client";

/// Cookie carrying the short-lived access token
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Cookie carrying the long-lived refresh token
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Access token lifetime in seconds (15 minutes)
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Refresh token / server-side session lifetime in seconds (7 days)
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Development-only signing secrets. Both binaries warn when they fall back to these.
pub const DEV_ACCESS_SECRET: &str = "pdfdesk-dev-access-secret-change-me";
pub const DEV_REFRESH_SECRET: &str = "pdfdesk-dev-refresh-secret-change-me";

/// Default HTTP port of the backend API
pub const DEFAULT_BACKEND_PORT: u16 = 3002;

/// Default HTTP port of the gateway
pub const DEFAULT_GATEWAY_PORT: u16 = 3000;

/// Default backend origin used by the gateway
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3002";

/// Default statistics window
pub const DEFAULT_TIME_RANGE: &str = "30d";

/// Maximum accepted upload size in bytes (50 MiB)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Storage capacity used for the "percentage used" statistic (100 GiB)
pub const STORAGE_CAPACITY_BYTES: u64 = 100 * 1024 * 1024 * 1024;
