// Users, sessions, LinkedIn profiles and SMS digest bookkeeping.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{enum_column, new_id, Database, StoreError};
use crate::models::{LinkedinProfile, NewUser, Session, User};

const USER_COLUMNS: &str =
    "id, email, password_hash, role, company, full_name, phone, created_at, last_login, is_active";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: enum_column(3, &role)?,
        company: row.get(4)?,
        full_name: row.get(5)?,
        phone: row.get(6)?,
        created_at: row.get(7)?,
        last_login: row.get(8)?,
        is_active: row.get(9)?,
    })
}

impl Database {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Register a user. Emails are stored lower-cased; a duplicate email
    /// fails with [`StoreError::EmailTaken`].
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let conn = self.conn();
        let email = new.email.trim().to_lowercase();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                params![email],
                |row| row.get(0),
            )
            .context("failed to check for existing user")?;
        if exists {
            return Err(StoreError::EmailTaken(email).into());
        }

        let user = User {
            id: new_id(),
            email,
            password_hash: new.password_hash.clone(),
            role: new.role,
            company: new.company.clone(),
            full_name: new.full_name.clone(),
            phone: None,
            created_at: Utc::now(),
            last_login: None,
            is_active: true,
        };
        conn.execute(
            "INSERT INTO users (id, email, password_hash, role, company, full_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.email,
                user.password_hash,
                user.role.as_str(),
                user.company,
                user.full_name,
                user.created_at,
            ],
        )
        .context("failed to insert user")?;
        Ok(user)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email.trim().to_lowercase()],
            user_from_row,
        )
        .optional()
        .context("failed to look up user by email")
    }

    pub fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .context("failed to look up user by id")
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at"
            ))
            .context("failed to prepare list_users query")?;
        let users = stmt
            .query_map([], user_from_row)
            .context("failed to query users")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map user rows")?;
        Ok(users)
    }

    pub fn touch_last_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE users SET last_login = ?2 WHERE id = ?1",
            params![user_id, at],
        )
        .context("failed to update last_login")?;
        Ok(())
    }

    pub fn set_user_phone(&self, user_id: &str, phone: Option<&str>) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE users SET phone = ?2 WHERE id = ?1",
            params![user_id, phone],
        )
        .context("failed to update phone")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn create_session(
        &self,
        session_id: &str,
        user_id: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, user_id, created_at, expires_at],
        )
        .context("failed to insert session")?;
        Ok(Session {
            id: session_id.to_string(),
            user_id: user_id.to_string(),
            created_at,
            expires_at,
        })
    }

    /// Resolve a live session to its active user. Expired sessions, missing
    /// sessions and deactivated users all yield `None`.
    pub fn session_user(&self, session_id: &str, now: DateTime<Utc>) -> Result<Option<User>> {
        let conn = self.conn();
        let columns = USER_COLUMNS
            .split(", ")
            .map(|c| format!("u.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        conn.query_row(
            &format!(
                "SELECT {columns} FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.id = ?1 AND s.expires_at > ?2 AND u.is_active = 1"
            ),
            params![session_id, now],
            user_from_row,
        )
        .optional()
        .context("failed to resolve session")
    }

    /// Returns `true` if a session row was removed.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let conn = self.conn();
        let n = conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![session_id])
            .context("failed to delete session")?;
        Ok(n > 0)
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn();
        conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
            .context("failed to purge expired sessions")
    }

    // ------------------------------------------------------------------
    // LinkedIn profiles
    // ------------------------------------------------------------------

    pub fn save_linkedin_profile(&self, profile: &LinkedinProfile) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO linkedin_profiles
                (user_id, linkedin_id, email, first_name, last_name, headline, picture_url, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(user_id) DO UPDATE SET
                linkedin_id = excluded.linkedin_id,
                email       = excluded.email,
                first_name  = excluded.first_name,
                last_name   = excluded.last_name,
                headline    = excluded.headline,
                picture_url = excluded.picture_url,
                fetched_at  = excluded.fetched_at",
            params![
                profile.user_id,
                profile.linkedin_id,
                profile.email,
                profile.first_name,
                profile.last_name,
                profile.headline,
                profile.picture_url,
                profile.fetched_at.unwrap_or_else(Utc::now),
            ],
        )
        .context("failed to save linkedin profile")?;
        Ok(())
    }

    pub fn linkedin_profile(&self, user_id: &str) -> Result<Option<LinkedinProfile>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT user_id, linkedin_id, email, first_name, last_name, headline, picture_url, fetched_at
             FROM linkedin_profiles WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(LinkedinProfile {
                    user_id: row.get(0)?,
                    linkedin_id: row.get(1)?,
                    email: row.get(2)?,
                    first_name: row.get(3)?,
                    last_name: row.get(4)?,
                    headline: row.get(5)?,
                    picture_url: row.get(6)?,
                    fetched_at: row.get(7)?,
                })
            },
        )
        .optional()
        .context("failed to load linkedin profile")
    }

    // ------------------------------------------------------------------
    // SMS digests
    // ------------------------------------------------------------------

    /// Record that a digest went out. Returns `false` if one was already
    /// recorded for that user and day.
    pub fn record_sms_digest(
        &self,
        user_id: &str,
        day: NaiveDate,
        signal_count: usize,
        sent_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn();
        let n = conn
            .execute(
                "INSERT OR IGNORE INTO sms_digests (user_id, day, signal_count, sent_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, day.to_string(), signal_count as i64, sent_at],
            )
            .context("failed to record sms digest")?;
        Ok(n > 0)
    }

    pub fn sms_sent_on(&self, user_id: &str, day: NaiveDate) -> Result<bool> {
        let conn = self.conn();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sms_digests WHERE user_id = ?1 AND day = ?2)",
            params![user_id, day.to_string()],
            |row| row.get(0),
        )
        .context("failed to check sms digest history")
    }
}
