use std::fmt::Display;
use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use pdfdesk_shared::passwords::{hash_password, password_policy_violation};
use pdfdesk_shared::Role;
use pdfdesk_store::{Database, LogType, Severity, SystemLog, User};

/// Prompt input and report output of a command.
pub struct Console<R, W> {
    input: R,
    output: W,
    assume_yes: bool,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W, assume_yes: bool) -> Self {
        Self {
            input,
            output,
            assume_yes,
        }
    }

    fn say(&mut self, line: impl Display) -> Result<()> {
        writeln!(self.output, "{line}")?;
        Ok(())
    }

    fn prompt(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{question}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            bail!("unexpected end of input");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Ask a `[y/N]` question. `--yes` answers it without reading input.
    fn confirm(&mut self, question: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        let answer = self.prompt(&format!("{question} [y/N] "))?;
        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

fn find_user(db: &Database, email: &str) -> Result<User> {
    db.find_user_by_email(email)?
        .ok_or_else(|| anyhow!("no user with email {email}"))
}

pub fn list_users<R: BufRead, W: Write>(db: &Database, console: &mut Console<R, W>) -> Result<()> {
    let users = db.list_users()?;
    if users.is_empty() {
        return console.say("No users.");
    }

    console.say(format!(
        "{:<36}  {:<32}  {:<5}  {:<6}  {:<7}  {:>11}  LAST LOGIN",
        "ID", "EMAIL", "ROLE", "AUTH", "BLOCKED", "CONVERSIONS"
    ))?;
    for user in users {
        console.say(format!(
            "{:<36}  {:<32}  {:<5}  {:<6}  {:<7}  {:>11}  {}",
            user.id,
            user.email,
            user.role,
            user.provider.as_str(),
            if user.is_blocked { "yes" } else { "no" },
            user.total_conversions,
            user.last_login
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string()),
        ))?;
    }
    Ok(())
}

pub fn reset_password<R: BufRead, W: Write>(
    db: &Database,
    console: &mut Console<R, W>,
    email: &str,
) -> Result<()> {
    let user = find_user(db, email)?;

    let password = console.prompt("New password: ")?;
    if let Some(reason) = password_policy_violation(&password) {
        bail!("{reason}");
    }
    if console.prompt("Repeat password: ")? != password {
        bail!("passwords do not match");
    }

    if !console.confirm(&format!("Reset the password of {}?", user.email))? {
        return console.say("Aborted.");
    }

    db.set_password_hash(user.id, &hash_password(&password)?)?;
    let revoked = db.delete_user_sessions(user.id)?;
    info!(user = %user.id, revoked, "Password reset");
    console.say(format!(
        "Password updated for {}. {revoked} session(s) revoked.",
        user.email
    ))
}

pub fn set_role<R: BufRead, W: Write>(
    db: &Database,
    console: &mut Console<R, W>,
    email: &str,
    role: Role,
) -> Result<()> {
    let user = find_user(db, email)?;
    if user.role == role {
        return console.say(format!("{} is already {role}.", user.email));
    }
    if !console.confirm(&format!("Change {} from {} to {role}?", user.email, user.role))? {
        return console.say("Aborted.");
    }

    db.set_role(user.id, role)?;
    db.insert_log(
        &SystemLog::new(
            LogType::UserAction,
            Severity::Low,
            format!("Changed role of {} to {role}", user.email),
        )
        .with_details("via pdfdesk-admin"),
    )?;
    info!(user = %user.id, %role, "Role changed");
    console.say(format!("{} is now {role}.", user.email))
}

pub fn set_blocked<R: BufRead, W: Write>(
    db: &Database,
    console: &mut Console<R, W>,
    email: &str,
    blocked: bool,
) -> Result<()> {
    let user = find_user(db, email)?;
    if blocked && user.role.is_admin() {
        bail!("{} is an admin; change the role to user before blocking", user.email);
    }
    if user.is_blocked == blocked {
        let state = if blocked { "blocked" } else { "not blocked" };
        return console.say(format!("{} is already {state}.", user.email));
    }

    let verb = if blocked { "Block" } else { "Unblock" };
    if !console.confirm(&format!("{verb} {}?", user.email))? {
        return console.say("Aborted.");
    }

    db.set_blocked(user.id, blocked)?;
    let revoked = if blocked {
        db.delete_user_sessions(user.id)?
    } else {
        0
    };
    db.insert_log(
        &SystemLog::new(
            LogType::UserAction,
            Severity::Low,
            format!("{verb}ed user {}", user.email),
        )
        .with_details("via pdfdesk-admin"),
    )?;
    info!(user = %user.id, blocked, revoked, "Block state changed");
    console.say(format!("{verb}ed {}. {revoked} session(s) revoked.", user.email))
}

/// One entry of a `seed-logs` file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedEntry {
    #[serde(rename = "type")]
    log_type: LogType,
    severity: Severity,
    message: String,
    details: Option<String>,
    user_email: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl SeedEntry {
    fn into_log(self, user_id: Option<Uuid>) -> SystemLog {
        let mut log = SystemLog::new(self.log_type, self.severity, self.message)
            .with_user(user_id, self.user_email)
            .with_client(self.ip_address, self.user_agent);
        log.details = self.details;
        if let Some(at) = self.timestamp {
            log.created_at = at;
        }
        log
    }
}

pub fn seed_logs<R: BufRead, W: Write>(
    db: &Database,
    console: &mut Console<R, W>,
    file: &Path,
) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let entries: Vec<SeedEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", file.display()))?;

    if entries.is_empty() {
        return console.say("Nothing to insert.");
    }
    if !console.confirm(&format!("Insert {} log entries?", entries.len()))? {
        return console.say("Aborted.");
    }

    let count = entries.len();
    for entry in entries {
        let user_id = match entry.user_email.as_deref() {
            Some(email) => db.find_user_by_email(email)?.map(|u| u.id),
            None => None,
        };
        db.insert_log(&entry.into_log(user_id))?;
    }

    info!(count, "Seeded system logs");
    console.say(format!("Inserted {count} log entries."))
}

pub fn purge_sessions<R: BufRead, W: Write>(db: &Database, console: &mut Console<R, W>) -> Result<()> {
    if !console.confirm("Delete all expired sessions?")? {
        return console.say("Aborted.");
    }
    let purged = db.purge_expired_sessions(Utc::now())?;
    console.say(format!("Deleted {purged} expired session(s)."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pdfdesk_shared::passwords::verify_password;
    use pdfdesk_store::{LogFilter, NewUser, Provider};
    use std::io::Cursor;

    fn db_with_user(email: &str, role: Role) -> (Database, User) {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .create_user(&NewUser {
                name: "Ada".into(),
                email: email.into(),
                role,
                password_hash: Some(hash_password("old-password1").unwrap()),
                google_id: None,
                provider: Provider::Email,
            })
            .unwrap();
        (db, user)
    }

    fn console(input: &str, yes: bool) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new(), yes)
    }

    fn output(console: Console<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(console.output).unwrap()
    }

    #[test]
    fn reset_password_asks_twice_and_confirms() {
        let (db, user) = db_with_user("ada@example.com", Role::User);
        db.create_session(user.id, "h1", Utc::now() + Duration::days(1))
            .unwrap();

        let mut c = console("fresh-pass1\nfresh-pass1\ny\n", false);
        reset_password(&db, &mut c, "ADA@example.com").unwrap();

        let stored = db.get_user(user.id).unwrap().password_hash.unwrap();
        assert!(verify_password("fresh-pass1", &stored));
        assert!(db.find_session("h1").unwrap().is_none());
        assert!(output(c).contains("1 session(s) revoked"));
    }

    #[test]
    fn reset_password_rejects_mismatch_and_weak_passwords() {
        let (db, user) = db_with_user("ada@example.com", Role::User);

        let mut c = console("fresh-pass1\nfresh-pass2\n", true);
        assert!(reset_password(&db, &mut c, "ada@example.com").is_err());

        let mut c = console("short\n", true);
        assert!(reset_password(&db, &mut c, "ada@example.com").is_err());

        let stored = db.get_user(user.id).unwrap().password_hash.unwrap();
        assert!(verify_password("old-password1", &stored));
    }

    #[test]
    fn declining_changes_nothing() {
        let (db, user) = db_with_user("ada@example.com", Role::User);
        let mut c = console("n\n", false);
        set_role(&db, &mut c, "ada@example.com", Role::Admin).unwrap();

        assert_eq!(db.get_user(user.id).unwrap().role, Role::User);
        assert!(output(c).contains("Aborted."));
    }

    #[test]
    fn set_role_with_yes_skips_the_prompt() {
        let (db, user) = db_with_user("ada@example.com", Role::User);
        let mut c = console("", true);
        set_role(&db, &mut c, "ada@example.com", Role::Admin).unwrap();
        assert_eq!(db.get_user(user.id).unwrap().role, Role::Admin);
    }

    #[test]
    fn block_and_unblock() {
        let (db, user) = db_with_user("ada@example.com", Role::User);

        set_blocked(&db, &mut console("", true), "ada@example.com", true).unwrap();
        assert!(db.get_user(user.id).unwrap().is_blocked);

        set_blocked(&db, &mut console("", true), "ada@example.com", false).unwrap();
        assert!(!db.get_user(user.id).unwrap().is_blocked);
    }

    #[test]
    fn admins_cannot_be_blocked() {
        let (db, user) = db_with_user("root@example.com", Role::Admin);
        assert!(set_blocked(&db, &mut console("", true), "root@example.com", true).is_err());
        assert!(!db.get_user(user.id).unwrap().is_blocked);
    }

    #[test]
    fn unknown_email_is_an_error() {
        let (db, _) = db_with_user("ada@example.com", Role::User);
        let err = set_role(&db, &mut console("", true), "bob@example.com", Role::Admin)
            .unwrap_err();
        assert!(err.to_string().contains("bob@example.com"));
    }

    #[test]
    fn seed_logs_from_file() {
        let (db, user) = db_with_user("ada@example.com", Role::User);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.json");
        std::fs::write(
            &path,
            r#"[
                {"type": "login_failure", "severity": "medium", "message": "Bad password",
                 "userEmail": "ada@example.com", "ipAddress": "198.51.100.1"},
                {"type": "system_error", "severity": "critical", "message": "Disk full",
                 "details": "/var at 100%", "timestamp": "2025-01-02T03:04:05Z"}
            ]"#,
        )
        .unwrap();

        let mut c = console("", true);
        seed_logs(&db, &mut c, &path).unwrap();

        let (logs, total) = db.query_logs(&LogFilter::default()).unwrap();
        assert_eq!(total, 2);
        let login = logs.iter().find(|l| l.log_type == LogType::LoginFailure).unwrap();
        assert_eq!(login.user_id, Some(user.id));
        let disk = logs.iter().find(|l| l.log_type == LogType::SystemError).unwrap();
        assert_eq!(disk.details.as_deref(), Some("/var at 100%"));
        assert_eq!(disk.created_at.to_rfc3339(), "2025-01-02T03:04:05+00:00");
    }

    #[test]
    fn purge_sessions_removes_only_expired() {
        let (db, user) = db_with_user("ada@example.com", Role::User);
        db.create_session(user.id, "old", Utc::now() - Duration::hours(1))
            .unwrap();
        db.create_session(user.id, "live", Utc::now() + Duration::hours(1))
            .unwrap();

        let mut c = console("yes\n", false);
        purge_sessions(&db, &mut c).unwrap();

        assert!(db.find_session("old").unwrap().is_none());
        assert!(db.find_session("live").unwrap().is_some());
        assert!(output(c).contains("Deleted 1 expired session(s)."));
    }
}
