//! `settings` table access: named, JSON-encoded bot settings.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{to_millis, StoreError};

/// Whether sent videos are marked as non-forwardable
pub const FORWARD_PROTECTION: &str = "forward_protection_enabled";

pub fn get<T: DeserializeOwned>(conn: &Connection, name: &str) -> Result<Option<T>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn set<T: Serialize>(
    conn: &Connection,
    name: &str,
    value: &T,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings (name, value, updated_at_ms) VALUES (?1, ?2, ?3) \
         ON CONFLICT (name) DO UPDATE SET value = excluded.value, updated_at_ms = excluded.updated_at_ms",
        params![name, raw, to_millis(now)],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;

    #[test]
    fn test_get_set() {
        let db = Database::open_in_memory().unwrap();

        db.with_conn(|conn| {
            assert_eq!(get::<bool>(conn, FORWARD_PROTECTION)?, None);

            set(conn, FORWARD_PROTECTION, &true, Utc::now())?;
            assert_eq!(get::<bool>(conn, FORWARD_PROTECTION)?, Some(true));

            set(conn, FORWARD_PROTECTION, &false, Utc::now())?;
            assert_eq!(get::<bool>(conn, FORWARD_PROTECTION)?, Some(false));
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }
}
