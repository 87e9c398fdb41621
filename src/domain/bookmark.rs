//! Temporary bookmarks.
//!
//! A bookmark is visible for exactly ten minutes after creation. Visibility
//! is a pure function of timestamps so that read-time eviction and a
//! background sweep always agree.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;
use super::video::VideoId;

/// Maximum live bookmarks per user
pub const BOOKMARK_LIMIT: usize = 5;

/// Lifetime of a bookmark in minutes
pub const BOOKMARK_TTL_MINUTES: i64 = 10;

/// Lifetime of a bookmark
pub fn bookmark_ttl() -> Duration {
    Duration::minutes(BOOKMARK_TTL_MINUTES)
}

/// A user's bookmark on a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub user_id: UserId,

    /// Weak reference; the video may be removed later
    pub video_id: VideoId,

    pub created_at: DateTime<Utc>,
}

/// Visibility of a bookmark at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkState {
    Live { remaining: Duration },
    Expired,
}

impl Bookmark {
    pub fn new(user_id: UserId, video_id: VideoId, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            video_id,
            created_at,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + bookmark_ttl()
    }

    /// Live iff `now - created_at < ttl`
    pub fn state(&self, now: DateTime<Utc>) -> BookmarkState {
        let age = now - self.created_at;
        if age < bookmark_ttl() {
            BookmarkState::Live {
                remaining: bookmark_ttl() - age,
            }
        } else {
            BookmarkState::Expired
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state(now), BookmarkState::Live { .. })
    }
}

/// Oldest creation time that is still live at `now`, exclusive.
///
/// Bookmarks created at or before this instant are expired.
pub fn expiry_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - bookmark_ttl()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_state_boundary() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let bookmark = Bookmark::new(1, 10, t);

        assert_eq!(
            bookmark.state(t),
            BookmarkState::Live {
                remaining: Duration::minutes(10)
            }
        );
        assert!(bookmark.is_live(t + Duration::minutes(10) - Duration::milliseconds(1)));
        assert_eq!(bookmark.state(t + Duration::minutes(10)), BookmarkState::Expired);
        assert_eq!(bookmark.state(t + Duration::hours(1)), BookmarkState::Expired);
    }

    #[test]
    fn test_cutoff_matches_state() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let cutoff = expiry_cutoff(now);

        assert!(!Bookmark::new(1, 1, cutoff).is_live(now));
        assert!(Bookmark::new(1, 1, cutoff + Duration::milliseconds(1)).is_live(now));
    }
}
