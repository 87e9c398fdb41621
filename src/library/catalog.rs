//! The content store: category → ordered video records.
//!
//! Records are keyed by their source message. Uniqueness is a database
//! constraint, so concurrent inserts of the same source leave exactly one
//! row no matter how the callers interleave.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Category, NewVideo, SourceRef, VideoId, VideoRecord};
use crate::store::{from_millis, to_millis, Database, StoreError};

/// Columns of a video row, in `read_video` order
pub(crate) const VIDEO_COLUMNS: &str = "video_id, category, channel_id, message_seq, file_id, \
                                         caption, file_name, file_size, ingested_at_ms";

pub(crate) fn read_video(row: &Row<'_>) -> rusqlite::Result<VideoRecord> {
    let category: i64 = row.get("category")?;
    let category = Category::from_number(category).ok_or(rusqlite::Error::IntegralValueOutOfRange(1, category))?;

    Ok(VideoRecord {
        id: row.get("video_id")?,
        category,
        source: SourceRef::new(row.get("channel_id")?, row.get("message_seq")?),
        file_id: row.get("file_id")?,
        caption: row.get("caption")?,
        file_name: row.get("file_name")?,
        file_size: row.get::<_, i64>("file_size")?.max(0) as u64,
        ingested_at: from_millis(row.get("ingested_at_ms")?)?,
    })
}

pub(crate) fn get_video(conn: &Connection, id: VideoId) -> Result<Option<VideoRecord>, StoreError> {
    let sql = format!("SELECT {} FROM videos WHERE video_id = ?1", VIDEO_COLUMNS);
    Ok(conn.query_row(&sql, params![id], read_video).optional()?)
}

fn count_in(conn: &Connection, category: Category) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM videos WHERE category = ?1",
        params![category.number()],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

fn nth_in(conn: &Connection, category: Category, offset: u64) -> Result<Option<VideoRecord>, StoreError> {
    let sql = format!(
        "SELECT {} FROM videos WHERE category = ?1 ORDER BY message_seq, video_id LIMIT 1 OFFSET ?2",
        VIDEO_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![category.number(), offset as i64], read_video)
        .optional()?)
}

/// Durable video library shared by ingestion and navigation
#[derive(Clone)]
pub struct ContentStore {
    db: Database,
}

impl ContentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Insert unless a record with the same source already exists.
    ///
    /// Returns true iff a new record was created.
    pub fn insert_if_absent(&self, video: &NewVideo, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO videos \
                 (category, channel_id, message_seq, file_id, caption, file_name, file_size, ingested_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    video.category.number(),
                    video.source.channel_id,
                    video.source.message_seq,
                    video.file_id,
                    video.caption,
                    video.file_name,
                    video.file_size as i64,
                    to_millis(now),
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get(&self, id: VideoId) -> Result<Option<VideoRecord>, StoreError> {
        self.db.with_conn(|conn| get_video(conn, id))
    }

    pub fn find_by_source(&self, source: SourceRef) -> Result<Option<VideoRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM videos WHERE channel_id = ?1 AND message_seq = ?2",
                VIDEO_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![source.channel_id, source.message_seq], read_video)
                .optional()?)
        })
    }

    /// Delete a record. Bookmarks pointing at it become dangling.
    pub fn remove(&self, id: VideoId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM videos WHERE video_id = ?1", params![id])?;
            Ok(removed == 1)
        })
    }

    pub fn count(&self, category: Category) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| count_in(conn, category))
    }

    /// Record count for every category, empty ones included
    pub fn count_by_category(&self) -> Result<BTreeMap<Category, u64>, StoreError> {
        self.db.with_conn(|conn| {
            let mut counts: BTreeMap<Category, u64> =
                Category::ALL.iter().map(|c| (*c, 0)).collect();

            let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM videos GROUP BY category")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (category, n) = row?;
                if let Some(category) = Category::from_number(category) {
                    counts.insert(category, n as u64);
                }
            }
            Ok(counts)
        })
    }

    /// The record at `index` in append order, wrapping modulo the category size
    pub fn video_at(&self, category: Category, index: u64) -> Result<Option<VideoRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let len = count_in(conn, category)?;
            if len == 0 {
                return Ok(None);
            }
            nth_in(conn, category, index % len)
        })
    }

    /// A uniformly random record from the category
    pub fn random_video(&self, category: Category) -> Result<Option<VideoRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let len = count_in(conn, category)?;
            if len == 0 {
                return Ok(None);
            }
            let offset = rand::thread_rng().gen_range(0..len);
            nth_in(conn, category, offset)
        })
    }

    /// Highest message sequence ingested from a channel
    pub fn cursor(&self, channel_id: i64) -> Result<Option<i64>, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT last_seq FROM ingestion_cursors WHERE channel_id = ?1",
                    params![channel_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn cursors(&self) -> Result<BTreeMap<i64, i64>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT channel_id, last_seq FROM ingestion_cursors")?;
            let cursors = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<BTreeMap<i64, i64>>>()?;
            Ok(cursors)
        })
    }

    /// Move a channel's cursor forward; never moves it back
    pub fn advance_cursor(&self, channel_id: i64, seq: i64, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ingestion_cursors (channel_id, last_seq, updated_at_ms) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (channel_id) DO UPDATE SET \
                 last_seq = MAX(last_seq, excluded.last_seq), updated_at_ms = excluded.updated_at_ms",
                params![channel_id, seq, to_millis(now)],
            )?;
            Ok(())
        })
    }
}
