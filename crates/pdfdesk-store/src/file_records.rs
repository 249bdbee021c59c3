use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    parse_column, parse_db_time, parse_uuid, to_db_time, ConversionStatus, FileRecord,
    FileRecordWithOwner, OwnerSummary, TimeWindow,
};

const RECORD_COLUMNS: &str = "f.id, f.user_id, f.tool_type, f.original_file_name,
     f.converted_file_name, f.file_size, f.status, f.processing_location,
     f.ip_address, f.user_agent, f.created_at";

// Shared predicate for windowed aggregates; ?1 and ?2 are nullable bounds.
const WINDOW_CLAUSE: &str =
    "(?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at < ?2)";

/// Per-status totals over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl Database {
    pub fn insert_file_record(&self, record: &FileRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO file_records (id, user_id, tool_type, original_file_name,
                                           converted_file_name, file_size, status,
                                           processing_location, ip_address, user_agent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id.to_string(),
                    record.user_id.map(|id| id.to_string()),
                    record.tool_type,
                    record.original_file_name,
                    record.converted_file_name,
                    record.file_size,
                    record.status.as_str(),
                    record.processing_location,
                    record.ip_address,
                    record.user_agent,
                    to_db_time(&record.created_at),
                ],
            )
            .map_err(StoreError::from_query)?;
        Ok(())
    }

    pub fn get_file_record(&self, id: Uuid) -> Result<FileRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM file_records f WHERE f.id = ?1"),
                params![id.to_string()],
                row_to_file_record,
            )
            .map_err(StoreError::from_query)
    }

    /// Every record newest first, joined with the owning account when there is one.
    pub fn list_file_records_with_owner(&self) -> Result<Vec<FileRecordWithOwner>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {RECORD_COLUMNS}, u.id, u.name, u.email
             FROM file_records f
             LEFT JOIN users u ON u.id = f.user_id
             ORDER BY f.created_at DESC"
        ))?;

        let rows = stmt.query_map([], |row| {
            let record = row_to_file_record(row)?;
            let owner_id: Option<String> = row.get(11)?;
            let owner = match owner_id {
                Some(id) => Some(OwnerSummary {
                    id: parse_uuid(11, &id)?,
                    name: row.get(12)?,
                    email: row.get(13)?,
                }),
                None => None,
            };
            Ok(FileRecordWithOwner { record, owner })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_file_records(&self, window: TimeWindow) -> Result<i64> {
        let (from, until) = window.bounds();
        let count = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM file_records WHERE {WINDOW_CLAUSE}"),
            params![from, until],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_by_status(&self, window: TimeWindow) -> Result<StatusCounts> {
        let (from, until) = window.bounds();
        let mut stmt = self.conn().prepare(&format!(
            "SELECT status, COUNT(*) FROM file_records WHERE {WINDOW_CLAUSE} GROUP BY status"
        ))?;
        let rows = stmt.query_map(params![from, until], |row| {
            let status: String = row.get(0)?;
            Ok((parse_column::<ConversionStatus>(0, &status)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, n) = row?;
            match status {
                ConversionStatus::Pending => counts.pending = n,
                ConversionStatus::Processing => counts.processing = n,
                ConversionStatus::Completed => counts.completed = n,
                ConversionStatus::Failed => counts.failed = n,
            }
        }
        Ok(counts)
    }

    /// Sum of `file_size` over the window, 0 when empty.
    pub fn total_file_size(&self, window: TimeWindow) -> Result<i64> {
        let (from, until) = window.bounds();
        let total = self.conn().query_row(
            &format!("SELECT COALESCE(SUM(file_size), 0) FROM file_records WHERE {WINDOW_CLAUSE}"),
            params![from, until],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// `(tool_type, count)` pairs, most frequent first.
    pub fn count_by_tool_type(&self, window: TimeWindow) -> Result<Vec<(String, i64)>> {
        let (from, until) = window.bounds();
        let mut stmt = self.conn().prepare(&format!(
            "SELECT tool_type, COUNT(*) AS n FROM file_records WHERE {WINDOW_CLAUSE}
             GROUP BY tool_type ORDER BY n DESC, tool_type ASC"
        ))?;
        let rows = stmt.query_map(params![from, until], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// `(YYYY-MM-DD, count)` since `from`, newest day first.
    pub fn daily_counts(&self, from: DateTime<Utc>, limit: u32) -> Result<Vec<(String, i64)>> {
        self.bucketed_counts(10, from, limit)
    }

    /// `(YYYY-MM, count)` since `from`, newest month first.
    pub fn monthly_counts(&self, from: DateTime<Utc>, limit: u32) -> Result<Vec<(String, i64)>> {
        self.bucketed_counts(7, from, limit)
    }

    // Timestamps are fixed-width, so a prefix of the text is a calendar bucket.
    fn bucketed_counts(
        &self,
        prefix_len: u32,
        from: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn().prepare(
            "SELECT substr(created_at, 1, ?1) AS bucket, COUNT(*) FROM file_records
             WHERE created_at >= ?2
             GROUP BY bucket ORDER BY bucket DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![prefix_len, to_db_time(&from), limit], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_file_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let id_str: String = row.get(0)?;
    let user_id_str: Option<String> = row.get(1)?;
    let status_str: String = row.get(6)?;
    let created_str: String = row.get(10)?;

    Ok(FileRecord {
        id: parse_uuid(0, &id_str)?,
        user_id: user_id_str.as_deref().map(|s| parse_uuid(1, s)).transpose()?,
        tool_type: row.get(2)?,
        original_file_name: row.get(3)?,
        converted_file_name: row.get(4)?,
        file_size: row.get(5)?,
        status: parse_column(6, &status_str)?,
        processing_location: row.get(7)?,
        ip_address: row.get(8)?,
        user_agent: row.get(9)?,
        created_at: parse_db_time(10, &created_str)?,
    })
}
