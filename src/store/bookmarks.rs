//! `bookmarks` table access.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{from_millis, to_millis, StoreError};
use crate::domain::{Bookmark, UserId, VideoId, VideoRecord};
use crate::library::catalog::read_video;

/// All bookmarks of a user, newest first, joined with their videos.
///
/// The video is `None` when the record no longer exists.
pub fn list_with_videos(
    conn: &Connection,
    user_id: UserId,
) -> Result<Vec<(Bookmark, Option<VideoRecord>)>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT b.video_id AS bookmark_video_id, b.created_at_ms AS bookmarked_at_ms, \
                v.video_id, v.category, v.channel_id, v.message_seq, v.file_id, \
                v.caption, v.file_name, v.file_size, v.ingested_at_ms \
         FROM bookmarks b LEFT JOIN videos v ON v.video_id = b.video_id \
         WHERE b.user_id = ?1 \
         ORDER BY b.created_at_ms DESC, b.video_id DESC",
    )?;

    let rows = stmt.query_map(params![user_id], |row| {
        let bookmark = Bookmark {
            user_id,
            video_id: row.get("bookmark_video_id")?,
            created_at: from_millis(row.get("bookmarked_at_ms")?)?,
        };
        let video = match row.get::<_, Option<VideoId>>("video_id")? {
            Some(_) => Some(read_video(row)?),
            None => None,
        };
        Ok((bookmark, video))
    })?;

    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert(conn: &Connection, bookmark: &Bookmark) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO bookmarks (user_id, video_id, created_at_ms) VALUES (?1, ?2, ?3)",
        params![bookmark.user_id, bookmark.video_id, to_millis(bookmark.created_at)],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, user_id: UserId, video_id: VideoId) -> Result<bool, StoreError> {
    let removed = conn.execute(
        "DELETE FROM bookmarks WHERE user_id = ?1 AND video_id = ?2",
        params![user_id, video_id],
    )?;
    Ok(removed == 1)
}

/// Delete every bookmark created at or before `cutoff`
pub fn delete_created_before(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM bookmarks WHERE created_at_ms <= ?1",
        params![to_millis(cutoff)],
    )?)
}
