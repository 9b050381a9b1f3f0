// SQLite persistence layer for users, prospects, generated material and
// research.

mod content;
mod prospects;
mod queue;
mod research;
mod signals;
mod users;

pub use queue::RetryOutcome;

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::Connection;
use thiserror::Error;

/// Store failures callers are expected to branch on. Everything else is an
/// opaque `anyhow` error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("email already registered: {0}")]
    EmailTaken(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

/// SQLite-backed store. One connection behind a mutex; every method takes
/// the lock for the duration of its statement(s).
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(SCHEMA)
            .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}

/// Fresh row id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Decode a JSON column, mapping failures to a rusqlite conversion error so
/// it can be used inside row closures.
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Decode an enum column stored as TEXT.
pub(crate) fn enum_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'bdr',
    company       TEXT,
    full_name     TEXT,
    phone         TEXT,
    created_at    TEXT NOT NULL,
    last_login    TEXT,
    is_active     INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS sessions (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prospects (
    id           TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name         TEXT NOT NULL,
    email        TEXT NOT NULL,
    title        TEXT,
    company      TEXT NOT NULL,
    domain       TEXT,
    linkedin_url TEXT,
    added_at     TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_prospects_dedup
    ON prospects(user_id, lower(email), lower(company));

CREATE TABLE IF NOT EXISTS accounts (
    id             TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name           TEXT NOT NULL,
    domain         TEXT,
    industry       TEXT,
    employee_count INTEGER,
    created_at     TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_name
    ON accounts(user_id, lower(name));

CREATE TABLE IF NOT EXISTS contacts (
    id           TEXT PRIMARY KEY,
    account_id   TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    name         TEXT NOT NULL,
    email        TEXT,
    title        TEXT,
    linkedin_url TEXT,
    source       TEXT NOT NULL DEFAULT 'manual',
    created_at   TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_contacts_email
    ON contacts(account_id, lower(email)) WHERE email IS NOT NULL;

CREATE TABLE IF NOT EXISTS generated_content (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    prospect_id TEXT REFERENCES prospects(id) ON DELETE SET NULL,
    kind        TEXT NOT NULL,
    subject     TEXT,
    body        TEXT NOT NULL,
    metadata    TEXT NOT NULL DEFAULT '{}',
    model       TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS email_cadences (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    prospect_id TEXT REFERENCES prospects(id) ON DELETE SET NULL,
    name        TEXT NOT NULL,
    steps       TEXT NOT NULL,
    model       TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS call_assessments (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    prospect_id   TEXT REFERENCES prospects(id) ON DELETE SET NULL,
    transcript    TEXT NOT NULL,
    overall_score REAL NOT NULL,
    payload       TEXT NOT NULL,
    model         TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS account_research (
    id           TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    account_id   TEXT REFERENCES accounts(id) ON DELETE SET NULL,
    company      TEXT NOT NULL,
    summary      TEXT NOT NULL,
    intent_score REAL,
    payload      TEXT NOT NULL,
    sources      TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS company_facts (
    id           TEXT PRIMARY KEY,
    company      TEXT NOT NULL,
    fact         TEXT NOT NULL,
    source_url   TEXT,
    source_title TEXT,
    confidence   REAL NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_company_facts_dedup
    ON company_facts(lower(company), fact);

CREATE TABLE IF NOT EXISTS research_sessions (
    id           TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    company      TEXT NOT NULL,
    status       TEXT NOT NULL,
    result       TEXT,
    error        TEXT,
    created_at   TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS job_signals (
    id          TEXT PRIMARY KEY,
    company     TEXT NOT NULL,
    title       TEXT NOT NULL,
    url         TEXT NOT NULL,
    keywords    TEXT NOT NULL,
    match_score REAL NOT NULL,
    source      TEXT NOT NULL,
    snippet     TEXT,
    detected_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_job_signals_company
    ON job_signals(lower(company), detected_at);

CREATE TABLE IF NOT EXISTS email_queue (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    prospect_id   TEXT NOT NULL REFERENCES prospects(id) ON DELETE CASCADE,
    subject       TEXT NOT NULL,
    body          TEXT NOT NULL,
    story_score   REAL,
    status        TEXT NOT NULL DEFAULT 'queued',
    attempts      INTEGER NOT NULL DEFAULT 0,
    scheduled_for TEXT NOT NULL,
    queued_at     TEXT NOT NULL,
    sent_at       TEXT
);
CREATE INDEX IF NOT EXISTS idx_email_queue_due
    ON email_queue(status, scheduled_for);

CREATE TABLE IF NOT EXISTS linkedin_profiles (
    user_id     TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    linkedin_id TEXT NOT NULL,
    email       TEXT,
    first_name  TEXT,
    last_name   TEXT,
    headline    TEXT,
    picture_url TEXT,
    fetched_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sms_digests (
    user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    day          TEXT NOT NULL,
    signal_count INTEGER NOT NULL,
    sent_at      TEXT NOT NULL,
    PRIMARY KEY (user_id, day)
);
";


#[cfg(test)]
mod tests {
    use super::test_support::test_db;

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 15);
    }

    #[test]
    fn open_is_idempotent_on_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let path = path.to_str().unwrap();
        drop(super::Database::open(path).unwrap());
        assert!(super::Database::open(path).is_ok());
    }

    #[test]
    fn foreign_keys_enforced() {
        let db = test_db();
        let conn = db.conn();
        let result = conn.execute(
            "INSERT INTO sessions (id, user_id, created_at, expires_at)
             VALUES ('s', 'missing-user', 'now', 'later')",
            [],
        );
        assert!(result.is_err());
    }
}
