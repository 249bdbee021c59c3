use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    parse_column, parse_db_time, parse_uuid, to_db_time, LogFilter, LogType, Severity, SystemLog,
};

const LOG_COLUMNS: &str = "id, log_type, severity, message, details, user_id, user_email,
     ip_address, user_agent, created_at";

// ?1 type, ?2 severity, ?3 search pattern, ?4 start (inclusive), ?5 end (inclusive)
const FILTER_CLAUSE: &str = "(?1 IS NULL OR log_type = ?1)
     AND (?2 IS NULL OR severity = ?2)
     AND (?3 IS NULL
          OR message LIKE ?3 ESCAPE '\\'
          OR details LIKE ?3 ESCAPE '\\'
          OR user_email LIKE ?3 ESCAPE '\\')
     AND (?4 IS NULL OR created_at >= ?4)
     AND (?5 IS NULL OR created_at <= ?5)";

impl Database {
    pub fn insert_log(&self, log: &SystemLog) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO system_logs (id, log_type, severity, message, details, user_id,
                                          user_email, ip_address, user_agent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    log.id.to_string(),
                    log.log_type.as_str(),
                    log.severity.as_str(),
                    log.message,
                    log.details,
                    log.user_id.map(|id| id.to_string()),
                    log.user_email,
                    log.ip_address,
                    log.user_agent,
                    to_db_time(&log.created_at),
                ],
            )
            .map_err(StoreError::from_query)?;
        Ok(())
    }

    pub fn get_log(&self, id: Uuid) -> Result<SystemLog> {
        self.conn()
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM system_logs WHERE id = ?1"),
                params![id.to_string()],
                row_to_log,
            )
            .map_err(StoreError::from_query)
    }

    /// One page of logs matching `filter`, newest first, plus the total
    /// number of matches ignoring pagination.
    pub fn query_logs(&self, filter: &LogFilter) -> Result<(Vec<SystemLog>, i64)> {
        let type_param = filter.log_type.map(|t| t.as_str());
        let severity_param = filter.severity.map(|s| s.as_str());
        let search_param = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);
        let start_param = filter.start.as_ref().map(to_db_time);
        let end_param = filter.end.as_ref().map(to_db_time);

        let total: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM system_logs WHERE {FILTER_CLAUSE}"),
            params![type_param, severity_param, search_param, start_param, end_param],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM system_logs WHERE {FILTER_CLAUSE}
             ORDER BY created_at DESC LIMIT ?6 OFFSET ?7"
        ))?;
        let rows = stmt.query_map(
            params![
                type_param,
                severity_param,
                search_param,
                start_param,
                end_param,
                filter.limit,
                filter.offset,
            ],
            row_to_log,
        )?;
        let logs = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)?;

        Ok((logs, total))
    }

    pub fn delete_log(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM system_logs WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    /// Delete the given logs in one transaction. Returns the number removed.
    pub fn delete_logs(&mut self, ids: &[Uuid]) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM system_logs WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute(params![id.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Count of logs per severity since `from`. Every severity is present.
    pub fn log_counts_by_severity(&self, from: DateTime<Utc>) -> Result<HashMap<Severity, i64>> {
        let mut counts: HashMap<Severity, i64> = Severity::ALL.into_iter().map(|s| (s, 0)).collect();
        for (severity, n) in self.grouped_log_counts("severity", from)? {
            counts.insert(severity, n);
        }
        Ok(counts)
    }

    /// Count of logs per type since `from`. Every type is present.
    pub fn log_counts_by_type(&self, from: DateTime<Utc>) -> Result<HashMap<LogType, i64>> {
        let mut counts: HashMap<LogType, i64> = LogType::ALL.into_iter().map(|t| (t, 0)).collect();
        for (log_type, n) in self.grouped_log_counts("log_type", from)? {
            counts.insert(log_type, n);
        }
        Ok(counts)
    }

    /// `(YYYY-MM-DD, count)` since `from`, newest day first.
    pub fn daily_log_counts(&self, from: DateTime<Utc>, limit: u32) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn().prepare(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*) FROM system_logs
             WHERE created_at >= ?1
             GROUP BY day ORDER BY day DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![to_db_time(&from), limit], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // `column` is one of the two literals passed above.
    fn grouped_log_counts<T>(&self, column: &str, from: DateTime<Utc>) -> Result<Vec<(T, i64)>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {column}, COUNT(*) FROM system_logs WHERE created_at >= ?1 GROUP BY {column}"
        ))?;
        let rows = stmt.query_map(params![to_db_time(&from)], |row| {
            let key: String = row.get(0)?;
            Ok((parse_column::<T>(0, &key)?, row.get(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

// Case-insensitive substring pattern; LIKE is ASCII case-insensitive in SQLite.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<SystemLog> {
    let id_str: String = row.get(0)?;
    let type_str: String = row.get(1)?;
    let severity_str: String = row.get(2)?;
    let user_id_str: Option<String> = row.get(5)?;
    let created_str: String = row.get(9)?;

    Ok(SystemLog {
        id: parse_uuid(0, &id_str)?,
        log_type: parse_column(1, &type_str)?,
        severity: parse_column(2, &severity_str)?,
        message: row.get(3)?,
        details: row.get(4)?,
        user_id: user_id_str.as_deref().map(|s| parse_uuid(5, s)).transpose()?,
        user_email: row.get(6)?,
        ip_address: row.get(7)?,
        user_agent: row.get(8)?,
        created_at: parse_db_time(9, &created_str)?,
    })
}
