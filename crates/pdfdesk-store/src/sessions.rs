use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{db_now, parse_db_time, parse_uuid, to_db_time, Session};

impl Database {
    /// Record a refresh token by its hash.
    pub fn create_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            created_at: db_now(),
        };

        self.conn()
            .execute(
                "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session.id.to_string(),
                    session.user_id.to_string(),
                    session.token_hash,
                    to_db_time(&session.expires_at),
                    to_db_time(&session.created_at),
                ],
            )
            .map_err(StoreError::from_query)?;

        Ok(session)
    }

    pub fn find_session(&self, token_hash: &str) -> Result<Option<Session>> {
        self.conn()
            .query_row(
                "SELECT id, user_id, token_hash, expires_at, created_at
                 FROM sessions WHERE token_hash = ?1",
                params![token_hash],
                row_to_session,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    pub fn delete_session(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    /// Revoke every session of a user. Returns the number removed.
    pub fn delete_user_sessions(&self, user_id: Uuid) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM sessions WHERE user_id = ?1",
            params![user_id.to_string()],
        )?;
        Ok(affected)
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![to_db_time(&now)],
        )?;
        Ok(affected)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let id_str: String = row.get(0)?;
    let user_id_str: String = row.get(1)?;
    let expires_str: String = row.get(3)?;
    let created_str: String = row.get(4)?;

    Ok(Session {
        id: parse_uuid(0, &id_str)?,
        user_id: parse_uuid(1, &user_id_str)?,
        token_hash: row.get(2)?,
        expires_at: parse_db_time(3, &expires_str)?,
        created_at: parse_db_time(4, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, Provider};
    use chrono::Duration;
    use pdfdesk_shared::Role;

    fn seed_user(db: &Database, email: &str) -> Uuid {
        db.create_user(&NewUser {
            name: "Session Owner".into(),
            email: email.into(),
            role: Role::User,
            password_hash: None,
            google_id: None,
            provider: Provider::Email,
        })
        .unwrap()
        .id
    }

    #[test]
    fn session_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let user_id = seed_user(&db, "a@example.com");
        let expires = db_now() + Duration::days(7);

        let created = db.create_session(user_id, "hash-1", expires).unwrap();
        let found = db.find_session("hash-1").unwrap().unwrap();
        assert_eq!(found, created);
        assert!(!found.is_expired(Utc::now()));
        assert!(db.find_session("hash-2").unwrap().is_none());
    }

    #[test]
    fn delete_and_revoke_all() {
        let db = Database::open_in_memory().unwrap();
        let user_id = seed_user(&db, "a@example.com");
        let expires = db_now() + Duration::days(7);

        let first = db.create_session(user_id, "h1", expires).unwrap();
        db.create_session(user_id, "h2", expires).unwrap();
        db.create_session(user_id, "h3", expires).unwrap();

        assert!(db.delete_session(first.id).unwrap());
        assert!(!db.delete_session(first.id).unwrap());
        assert_eq!(db.delete_user_sessions(user_id).unwrap(), 2);
        assert!(db.find_session("h2").unwrap().is_none());
    }

    #[test]
    fn purge_removes_only_expired() {
        let db = Database::open_in_memory().unwrap();
        let user_id = seed_user(&db, "a@example.com");
        let now = db_now();

        db.create_session(user_id, "old", now - Duration::minutes(1)).unwrap();
        db.create_session(user_id, "fresh", now + Duration::days(1)).unwrap();

        assert_eq!(db.purge_expired_sessions(now).unwrap(), 1);
        assert!(db.find_session("old").unwrap().is_none());
        assert!(db.find_session("fresh").unwrap().is_some());
    }

    #[test]
    fn session_for_unknown_user_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .create_session(Uuid::new_v4(), "orphan", db_now() + Duration::days(1))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
