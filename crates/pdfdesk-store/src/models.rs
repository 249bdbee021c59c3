//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed to
//! the HTTP layer or to the admin CLI's JSON output directly.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pdfdesk_shared::Role;

// ---------------------------------------------------------------------------
// Enumerated columns
// ---------------------------------------------------------------------------

/// A text column held a value no enum variant matches.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// How an account signs in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Email,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Email => "email",
            Provider::Google => "google",
        }
    }
}

impl FromStr for Provider {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Provider::Email),
            "google" => Ok(Provider::Google),
            _ => Err(UnknownVariant::new("provider", s)),
        }
    }
}

/// Outcome of a tracked conversion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversionStatus {
    Pending,
    Processing,
    #[default]
    Completed,
    Failed,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Pending => "PENDING",
            ConversionStatus::Processing => "PROCESSING",
            ConversionStatus::Completed => "COMPLETED",
            ConversionStatus::Failed => "FAILED",
        }
    }

    /// Label shown in the file management view.
    pub fn display_label(&self) -> &'static str {
        match self {
            ConversionStatus::Pending => "Pending",
            ConversionStatus::Processing => "Converting",
            ConversionStatus::Completed => "Completed",
            ConversionStatus::Failed => "Failed",
        }
    }
}

impl FromStr for ConversionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ConversionStatus::Pending),
            "PROCESSING" => Ok(ConversionStatus::Processing),
            "COMPLETED" => Ok(ConversionStatus::Completed),
            "FAILED" => Ok(ConversionStatus::Failed),
            _ => Err(UnknownVariant::new("conversion status", s)),
        }
    }
}

/// Category of a system log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    ConversionError,
    LoginFailure,
    SystemError,
    SecurityAlert,
    UserAction,
    ApiError,
}

impl LogType {
    pub const ALL: [LogType; 6] = [
        LogType::ConversionError,
        LogType::LoginFailure,
        LogType::SystemError,
        LogType::SecurityAlert,
        LogType::UserAction,
        LogType::ApiError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::ConversionError => "conversion_error",
            LogType::LoginFailure => "login_failure",
            LogType::SystemError => "system_error",
            LogType::SecurityAlert => "security_alert",
            LogType::UserAction => "user_action",
            LogType::ApiError => "api_error",
        }
    }
}

impl FromStr for LogType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        LogType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| UnknownVariant::new("log type", s))
    }
}

/// Severity of a system log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Severity::ALL
            .into_iter()
            .find(|v| v.as_str() == lowered)
            .ok_or_else(|| UnknownVariant::new("severity", s))
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account. Email is unique (case-insensitive) and is the
/// lookup key for sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub provider: Provider,
    pub is_blocked: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub total_conversions: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to register an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub provider: Provider,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Server-side record of an issued refresh token. Only the BLAKE3 hash of
/// the token is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ---------------------------------------------------------------------------
// File record
// ---------------------------------------------------------------------------

/// One tracked conversion. Read-only once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub tool_type: String,
    pub original_file_name: String,
    pub converted_file_name: Option<String>,
    pub file_size: i64,
    pub status: ConversionStatus,
    pub processing_location: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Name and email of the account that owns a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// A file record joined with its owner, if it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecordWithOwner {
    pub record: FileRecord,
    pub owner: Option<OwnerSummary>,
}

// ---------------------------------------------------------------------------
// System log
// ---------------------------------------------------------------------------

/// A timestamped operational event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SystemLog {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub severity: Severity,
    pub message: String,
    pub details: Option<String>,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl SystemLog {
    pub fn new(log_type: LogType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            log_type,
            severity,
            message: message.into(),
            details: None,
            user_id: None,
            user_email: None,
            ip_address: None,
            user_agent: None,
            created_at: db_now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_user(mut self, user_id: Option<Uuid>, email: Option<String>) -> Self {
        self.user_id = user_id;
        self.user_email = email;
        self
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Filters for listing system logs. `None` disables a filter.
#[derive(Debug, Clone)]
pub struct LogFilter {
    pub log_type: Option<LogType>,
    pub severity: Option<Severity>,
    pub search: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            log_type: None,
            severity: None,
            search: None,
            start: None,
            end: None,
            limit: 50,
            offset: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Time windows for aggregate queries
// ---------------------------------------------------------------------------

/// Half-open `[from, until)` range over `created_at`. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(from: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            until: None,
        }
    }

    pub fn between(from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            until: Some(until),
        }
    }

    pub(crate) fn bounds(&self) -> (Option<String>, Option<String>) {
        (
            self.from.as_ref().map(to_db_time),
            self.until.as_ref().map(to_db_time),
        )
    }
}

// ---------------------------------------------------------------------------
// Column codecs
// ---------------------------------------------------------------------------

/// Current time at the precision the database keeps.
pub(crate) fn db_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// Fixed-width UTC so that text comparison in SQL matches time order.
pub(crate) fn to_db_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_db_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn parse_role(idx: usize, value: &str) -> rusqlite::Result<Role> {
    value
        .parse::<Role>()
        .map_err(|_| conversion_failure(idx, UnknownVariant::new("role", value)))
}

fn conversion_failure<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}
