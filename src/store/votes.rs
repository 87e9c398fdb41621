//! `votes` table access (likes and dislikes).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{to_millis, StoreError};
use crate::domain::{UserId, VideoId};

/// Approval shown for a video nobody has voted on yet
pub const DEFAULT_APPROVAL_PERCENT: u8 = 77;

/// Record a vote, replacing the user's earlier vote on the same video
pub fn upsert(
    conn: &Connection,
    user_id: UserId,
    video_id: VideoId,
    liked: bool,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO votes (user_id, video_id, liked, updated_at_ms) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT (user_id, video_id) DO UPDATE SET \
         liked = excluded.liked, updated_at_ms = excluded.updated_at_ms",
        params![user_id, video_id, liked, to_millis(now)],
    )?;
    Ok(())
}

/// Likes as a whole percentage of all votes (rounded down)
pub fn approval_percent(conn: &Connection, video_id: VideoId) -> Result<u8, StoreError> {
    let (likes, total): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(liked), 0), COUNT(*) FROM votes WHERE video_id = ?1",
        params![video_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    if total == 0 {
        return Ok(DEFAULT_APPROVAL_PERCENT);
    }
    Ok((likes * 100 / total) as u8)
}
