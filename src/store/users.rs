//! `users` table access.
//!
//! Navigation columns and premium columns are written by separate
//! statements so the two owners never overwrite each other's fields.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{from_millis, to_millis, StoreError};
use crate::domain::{PremiumWindow, Selection, User, UserId};

const USER_COLUMNS: &str = "user_id, selection, position, last_video_id, watch_count, \
                            premium_started_ms, premium_expires_ms, created_at_ms";

fn read_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let selection: i64 = row.get("selection")?;
    let position: Option<i64> = row.get("position")?;
    let started: Option<i64> = row.get("premium_started_ms")?;
    let expires: Option<i64> = row.get("premium_expires_ms")?;

    let premium = match (started, expires) {
        (Some(started), Some(expires)) => Some(PremiumWindow {
            started_at: from_millis(started)?,
            expires_at: from_millis(expires)?,
        }),
        _ => None,
    };

    Ok(User {
        id: row.get("user_id")?,
        selection: Selection::from_code(selection).unwrap_or_default(),
        position: position.map(|p| p.max(0) as u64),
        last_video: row.get("last_video_id")?,
        watch_count: row.get::<_, i64>("watch_count")?.max(0) as u64,
        premium,
        created_at: from_millis(row.get("created_at_ms")?)?,
    })
}

pub fn get(conn: &Connection, id: UserId) -> Result<Option<User>, StoreError> {
    let sql = format!("SELECT {} FROM users WHERE user_id = ?1", USER_COLUMNS);
    Ok(conn.query_row(&sql, params![id], read_user).optional()?)
}

/// Insert a fresh user row; returns false if the user already exists
pub fn insert_if_absent(conn: &Connection, user: &User) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO users (user_id, selection, position, last_video_id, watch_count, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id,
            user.selection.code(),
            user.position.map(|p| p as i64),
            user.last_video,
            user.watch_count as i64,
            to_millis(user.created_at),
        ],
    )?;
    Ok(inserted == 1)
}

/// Persist the browsing cursor
pub fn update_navigation(conn: &Connection, user: &User) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE users SET selection = ?2, position = ?3, last_video_id = ?4, watch_count = ?5 \
         WHERE user_id = ?1",
        params![
            user.id,
            user.selection.code(),
            user.position.map(|p| p as i64),
            user.last_video,
            user.watch_count as i64,
        ],
    )?;
    Ok(())
}

/// Replace or clear the premium window; returns false for unknown users
pub fn set_premium(
    conn: &Connection,
    id: UserId,
    window: Option<&PremiumWindow>,
) -> Result<bool, StoreError> {
    let updated = conn.execute(
        "UPDATE users SET premium_started_ms = ?2, premium_expires_ms = ?3 WHERE user_id = ?1",
        params![
            id,
            window.map(|w| to_millis(w.started_at)),
            window.map(|w| to_millis(w.expires_at)),
        ],
    )?;
    Ok(updated == 1)
}

pub fn count(conn: &Connection) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Users whose window is still open at `now`
pub fn count_premium_active(conn: &Connection, now: DateTime<Utc>) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE premium_expires_ms IS NOT NULL AND premium_expires_ms > ?1",
        params![to_millis(now)],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Clear windows that have run out at `now`
pub fn clear_expired_premium(conn: &Connection, now: DateTime<Utc>) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "UPDATE users SET premium_started_ms = NULL, premium_expires_ms = NULL \
         WHERE premium_expires_ms IS NOT NULL AND premium_expires_ms <= ?1",
        params![to_millis(now)],
    )?)
}

pub fn all_ids(conn: &Connection) -> Result<Vec<UserId>, StoreError> {
    let mut stmt = conn.prepare("SELECT user_id FROM users ORDER BY user_id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<UserId>>>()?;
    Ok(ids)
}
