//! SQLite-backed document store.
//!
//! One connection behind a mutex, held only for a single statement or
//! transaction. Table access lives in the submodules as plain functions over
//! `&Connection` so callers can compose them inside one transaction.
//!
//! # Layout
//!
//! ```text
//! users             session cursor + premium window per user
//! videos            library records, UNIQUE(channel_id, message_seq)
//! bookmarks         (user_id, video_id) -> created_at
//! votes             (user_id, video_id) -> liked
//! settings          name -> JSON value
//! ingestion_cursors channel_id -> highest message_seq seen
//! ```

pub mod bookmarks;
pub mod settings;
pub mod users;
pub mod votes;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use thiserror::Error;

/// Errors from the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database connection lock poisoned")]
    Poisoned,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id            INTEGER PRIMARY KEY,
    selection          INTEGER NOT NULL DEFAULT 1,
    position           INTEGER,
    last_video_id      INTEGER,
    watch_count        INTEGER NOT NULL DEFAULT 0,
    premium_started_ms INTEGER,
    premium_expires_ms INTEGER,
    created_at_ms      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS videos (
    video_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    category       INTEGER NOT NULL,
    channel_id     INTEGER NOT NULL,
    message_seq    INTEGER NOT NULL,
    file_id        TEXT NOT NULL,
    caption        TEXT,
    file_name      TEXT,
    file_size      INTEGER NOT NULL DEFAULT 0,
    ingested_at_ms INTEGER NOT NULL,
    UNIQUE (channel_id, message_seq)
);

CREATE INDEX IF NOT EXISTS idx_videos_category
    ON videos (category, message_seq, video_id);

CREATE TABLE IF NOT EXISTS bookmarks (
    user_id       INTEGER NOT NULL,
    video_id      INTEGER NOT NULL,
    created_at_ms INTEGER NOT NULL,
    PRIMARY KEY (user_id, video_id)
);

CREATE INDEX IF NOT EXISTS idx_bookmarks_created ON bookmarks (created_at_ms);

CREATE TABLE IF NOT EXISTS votes (
    user_id       INTEGER NOT NULL,
    video_id      INTEGER NOT NULL,
    liked         INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL,
    PRIMARY KEY (user_id, video_id)
);

CREATE TABLE IF NOT EXISTS settings (
    name          TEXT PRIMARY KEY,
    value         TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ingestion_cursors (
    channel_id    INTEGER PRIMARY KEY,
    last_seq      INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
"#;

/// Shared handle to the database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file and apply the schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::init(conn)
    }

    /// In-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection
    pub fn with_conn<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    /// Run a closure inside an immediate transaction; commits only on `Ok`
    pub fn with_tx<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }
}

/// Timestamps are stored as UTC milliseconds
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}
