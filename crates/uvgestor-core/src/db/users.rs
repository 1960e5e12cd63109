//! Local session records

use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::{Guardian, User};

const USER_COLUMNS: &str = "id, email, name, created_at, guardians, is_minor";

impl Database {
    /// Store (or refresh) the local copy of a user and mark it as the latest login
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn()?;
        let guardians = serde_json::to_string(&user.guardians)?;

        conn.execute(
            r#"
            INSERT INTO users (id, email, name, created_at, guardians, is_minor, last_login_at)
            VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = excluded.name,
                guardians = excluded.guardians,
                is_minor = excluded.is_minor,
                last_login_at = CURRENT_TIMESTAMP
            "#,
            params![
                user.id,
                user.email,
                user.name,
                format_datetime(&user.created_at),
                guardians,
                user.is_minor,
            ],
        )?;

        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                params![id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Look up a stored user by email (case-insensitive)
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE lower(email) = lower(?) ORDER BY last_login_at DESC LIMIT 1",
                    USER_COLUMNS
                ),
                params![email.trim()],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// The most recently signed-in local user, if any
    pub fn get_current_user(&self) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users ORDER BY last_login_at DESC, rowid DESC LIMIT 1",
                    USER_COLUMNS
                ),
                [],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Store the password hash used to verify offline logins
    pub fn set_password_hash(&self, user_id: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE users SET password_hash = ? WHERE id = ?",
            params![password_hash, user_id],
        )?;
        Ok(rows > 0)
    }

    pub fn get_password_hash(&self, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let hash: Option<Option<String>> = conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash.flatten())
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let created_at_str: String = row.get(3)?;
        let guardians_json: String = row.get(4)?;
        let guardians: Vec<Guardian> = serde_json::from_str(&guardians_json).unwrap_or_default();
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: parse_datetime(&created_at_str),
            guardians,
            is_minor: row.get(5)?,
        })
    }
}
