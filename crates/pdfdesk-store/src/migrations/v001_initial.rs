//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `sessions`, `file_records` and
//! `system_logs`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id                TEXT PRIMARY KEY NOT NULL,       -- UUID v4
    name              TEXT NOT NULL,
    email             TEXT NOT NULL UNIQUE COLLATE NOCASE,
    role              TEXT NOT NULL DEFAULT 'user',    -- 'admin' | 'user'
    password_hash     TEXT,                            -- Argon2 PHC string
    google_id         TEXT UNIQUE,
    provider          TEXT NOT NULL DEFAULT 'email',   -- 'email' | 'google'
    is_blocked        INTEGER NOT NULL DEFAULT 0,      -- boolean 0/1
    last_login        TEXT,
    total_conversions INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL,                   -- RFC-3339 UTC, millis
    updated_at        TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Refresh sessions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    id         TEXT PRIMARY KEY NOT NULL,              -- UUID v4
    user_id    TEXT NOT NULL,                          -- FK -> users(id)
    token_hash TEXT NOT NULL UNIQUE,                   -- BLAKE3 of the refresh token
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);

-- ----------------------------------------------------------------
-- File records (one row per tracked conversion)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS file_records (
    id                  TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    user_id             TEXT,                          -- nullable FK -> users(id)
    tool_type           TEXT NOT NULL,
    original_file_name  TEXT NOT NULL,
    converted_file_name TEXT,
    file_size           INTEGER NOT NULL,
    status              TEXT NOT NULL,
    processing_location TEXT NOT NULL,
    ip_address          TEXT,
    user_agent          TEXT,
    created_at          TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_file_records_created_at ON file_records(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_file_records_user_id ON file_records(user_id);

-- ----------------------------------------------------------------
-- System logs
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS system_logs (
    id         TEXT PRIMARY KEY NOT NULL,              -- UUID v4
    log_type   TEXT NOT NULL,
    severity   TEXT NOT NULL,
    message    TEXT NOT NULL,
    details    TEXT,
    user_id    TEXT,
    user_email TEXT,
    ip_address TEXT,
    user_agent TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_system_logs_created_at ON system_logs(created_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
