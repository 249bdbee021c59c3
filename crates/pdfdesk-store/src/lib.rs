//! # pdfdesk-store
//!
//! Record store for the pdfdesk backend, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for users,
//! refresh sessions, file records and system logs, plus the aggregate
//! queries the statistics endpoints are built on.

pub mod database;
pub mod file_records;
pub mod migrations;
pub mod models;
pub mod sessions;
pub mod system_logs;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use file_records::StatusCounts;
pub use models::*;
