use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use pdfdesk_shared::Role;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    db_now, parse_column, parse_db_time, parse_role, parse_uuid, to_db_time, NewUser, User,
};

const USER_COLUMNS: &str = "id, name, email, role, password_hash, google_id, provider, is_blocked,
     last_login, total_conversions, created_at, updated_at";

impl Database {
    pub fn create_user(&self, new_user: &NewUser) -> Result<User> {
        let now = db_now();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name.clone(),
            email: new_user.email.trim().to_string(),
            role: new_user.role,
            password_hash: new_user.password_hash.clone(),
            google_id: new_user.google_id.clone(),
            provider: new_user.provider,
            is_blocked: false,
            last_login: None,
            total_conversions: 0,
            created_at: now,
            updated_at: now,
        };

        self.conn()
            .execute(
                "INSERT INTO users (id, name, email, role, password_hash, google_id, provider,
                                    is_blocked, last_login, total_conversions, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL, 0, ?8, ?8)",
                params![
                    user.id.to_string(),
                    user.name,
                    user.email,
                    user.role.as_str(),
                    user.password_hash,
                    user.google_id,
                    user.provider.as_str(),
                    to_db_time(&now),
                ],
            )
            .map_err(StoreError::from_query)?;

        Ok(user)
    }

    pub fn get_user(&self, id: Uuid) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(StoreError::from_query)
    }

    /// Case-insensitive lookup by email.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email.trim()],
                row_to_user,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        self.find_user_by_email(email)?.ok_or(StoreError::NotFound)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        self.update_user_column(id, "password_hash", password_hash)
    }

    pub fn set_role(&self, id: Uuid, role: Role) -> Result<bool> {
        self.update_user_column(id, "role", role.as_str())
    }

    pub fn set_blocked(&self, id: Uuid, blocked: bool) -> Result<bool> {
        self.update_user_column(id, "is_blocked", blocked as i32)
    }

    pub fn link_google_id(&self, id: Uuid, google_id: &str) -> Result<bool> {
        self.update_user_column(id, "google_id", google_id)
    }

    pub fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.update_user_column(id, "last_login", to_db_time(&at))
    }

    pub fn increment_conversions(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET total_conversions = total_conversions + 1, updated_at = ?2
             WHERE id = ?1",
            params![id.to_string(), to_db_time(&Utc::now())],
        )?;
        Ok(affected > 0)
    }

    // `column` is always one of the literals above, never caller input
    fn update_user_column<T: rusqlite::ToSql>(&self, id: Uuid, column: &str, value: T) -> Result<bool> {
        let affected = self
            .conn()
            .execute(
                &format!("UPDATE users SET {column} = ?2, updated_at = ?3 WHERE id = ?1"),
                params![id.to_string(), value, to_db_time(&Utc::now())],
            )
            .map_err(StoreError::from_query)?;
        Ok(affected > 0)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let role_str: String = row.get(3)?;
    let provider_str: String = row.get(6)?;
    let is_blocked_int: i32 = row.get(7)?;
    let last_login_str: Option<String> = row.get(8)?;
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;

    Ok(User {
        id: parse_uuid(0, &id_str)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: parse_role(3, &role_str)?,
        password_hash: row.get(4)?,
        google_id: row.get(5)?,
        provider: parse_column(6, &provider_str)?,
        is_blocked: is_blocked_int != 0,
        last_login: last_login_str
            .as_deref()
            .map(|s| parse_db_time(8, s))
            .transpose()?,
        total_conversions: row.get(9)?,
        created_at: parse_db_time(10, &created_str)?,
        updated_at: parse_db_time(11, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test User".into(),
            email: email.into(),
            role: Role::User,
            password_hash: Some("hash".into()),
            google_id: None,
            provider: Provider::Email,
        }
    }

    #[test]
    fn create_and_fetch_user() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_user(&new_user("ada@example.com")).unwrap();

        let by_id = db.get_user(created.id).unwrap();
        assert_eq!(by_id, created);
        assert!(!by_id.is_blocked);
        assert_eq!(by_id.total_conversions, 0);
    }

    #[test]
    fn email_lookup_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_user(&new_user("Ada@Example.com")).unwrap();

        let found = db.find_user_by_email("ada@example.COM").unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(db.find_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("ada@example.com")).unwrap();

        let err = db.create_user(&new_user("ADA@example.com")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn missing_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_user(Uuid::new_v4()), Err(StoreError::NotFound)));
        assert!(!db.set_blocked(Uuid::new_v4(), true).unwrap());
    }

    #[test]
    fn updates_are_persisted() {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&new_user("ada@example.com")).unwrap();

        assert!(db.set_role(user.id, Role::Admin).unwrap());
        assert!(db.set_blocked(user.id, true).unwrap());
        assert!(db.set_password_hash(user.id, "new-hash").unwrap());
        assert!(db.link_google_id(user.id, "google-sub-1").unwrap());
        assert!(db.record_login(user.id, Utc::now()).unwrap());
        assert!(db.increment_conversions(user.id).unwrap());
        assert!(db.increment_conversions(user.id).unwrap());

        let reloaded = db.get_user(user.id).unwrap();
        assert_eq!(reloaded.role, Role::Admin);
        assert!(reloaded.is_blocked);
        assert_eq!(reloaded.password_hash.as_deref(), Some("new-hash"));
        assert_eq!(reloaded.google_id.as_deref(), Some("google-sub-1"));
        assert!(reloaded.last_login.is_some());
        assert_eq!(reloaded.total_conversions, 2);
        assert!(reloaded.updated_at >= user.updated_at);
    }

    #[test]
    fn list_users_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let first = db.create_user(&new_user("a@example.com")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = db.create_user(&new_user("b@example.com")).unwrap();

        let users = db.list_users().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, second.id);
        assert_eq!(users[1].id, first.id);
    }
}
