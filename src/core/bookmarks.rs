//! Bounded, self-expiring bookmarks.
//!
//! Each user holds at most [`BOOKMARK_LIMIT`] live bookmarks. A bookmark is
//! visible iff it is younger than ten minutes; expired and dangling entries
//! are deleted the next time the user's set is touched, and `sweep` may
//! delete expired ones ahead of time with the same cutoff.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::debug;

use crate::domain::bookmark::expiry_cutoff;
use crate::domain::{Bookmark, BookmarkState, UserId, VideoId, VideoRecord, BOOKMARK_LIMIT};
use crate::library::catalog::get_video;
use crate::store::{bookmarks, Database, StoreError};

#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("You can only bookmark {limit} videos at a time")]
    LimitExceeded { limit: usize },

    #[error("Video not found: {0}")]
    VideoNotFound(VideoId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a successful `add`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkOutcome {
    Added(Bookmark),

    /// A live bookmark for this video already exists; nothing changed
    AlreadyBookmarked(Bookmark),
}

/// Why a bookmark was dropped on access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Expired,

    /// The bookmarked video no longer exists
    Dangling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub bookmark: Bookmark,
    pub reason: EvictionReason,
}

/// A visible bookmark resolved to its video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveBookmark {
    pub bookmark: Bookmark,
    pub video: VideoRecord,
    pub remaining: Duration,
}

/// Result of `list`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkListing {
    /// Newest first
    pub live: Vec<LiveBookmark>,
    pub evicted: Vec<Eviction>,
}

/// Owner of the bookmark collection
#[derive(Clone)]
pub struct BookmarkManager {
    db: Database,
}

impl BookmarkManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Bookmark a video for `user_id`.
    ///
    /// Fails with `LimitExceeded` and writes nothing when the user already
    /// holds the maximum number of live bookmarks.
    pub fn add(&self, user_id: UserId, video_id: VideoId, now: DateTime<Utc>) -> Result<BookmarkOutcome, BookmarkError> {
        self.db.with_tx(|tx| {
            if get_video(tx, video_id)?.is_none() {
                return Err(BookmarkError::VideoNotFound(video_id));
            }

            let mut live = 0;
            for eviction_or_live in partition(bookmarks::list_with_videos(tx, user_id)?, now) {
                match eviction_or_live {
                    Entry::Evicted(eviction) => {
                        bookmarks::delete(tx, user_id, eviction.bookmark.video_id)?;
                    }
                    Entry::Live(existing) if existing.bookmark.video_id == video_id => {
                        return Ok(BookmarkOutcome::AlreadyBookmarked(existing.bookmark));
                    }
                    Entry::Live(_) => live += 1,
                }
            }

            if live >= BOOKMARK_LIMIT {
                return Err(BookmarkError::LimitExceeded {
                    limit: BOOKMARK_LIMIT,
                });
            }

            let bookmark = Bookmark::new(user_id, video_id, now);
            bookmarks::insert(tx, &bookmark)?;
            debug!(user_id, video_id, "Bookmark added");
            Ok(BookmarkOutcome::Added(bookmark))
        })
    }

    /// Live bookmarks, evicting and reporting expired or dangling ones
    pub fn list(&self, user_id: UserId, now: DateTime<Utc>) -> Result<BookmarkListing, BookmarkError> {
        self.db.with_tx(|tx| {
            let mut listing = BookmarkListing::default();

            for entry in partition(bookmarks::list_with_videos(tx, user_id)?, now) {
                match entry {
                    Entry::Live(live) => listing.live.push(live),
                    Entry::Evicted(eviction) => {
                        bookmarks::delete(tx, user_id, eviction.bookmark.video_id)?;
                        debug!(user_id, video_id = eviction.bookmark.video_id, reason = ?eviction.reason, "Bookmark evicted");
                        listing.evicted.push(eviction);
                    }
                }
            }

            Ok(listing)
        })
    }

    /// Remove a bookmark; removing an absent one is not an error
    pub fn remove(&self, user_id: UserId, video_id: VideoId) -> Result<bool, BookmarkError> {
        Ok(self.db.with_conn(|conn| bookmarks::delete(conn, user_id, video_id))?)
    }

    /// Delete every bookmark expired at `now`
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<usize, BookmarkError> {
        let removed = self
            .db
            .with_conn(|conn| bookmarks::delete_created_before(conn, expiry_cutoff(now)))?;
        if removed > 0 {
            debug!(removed, "Swept expired bookmarks");
        }
        Ok(removed)
    }
}

enum Entry {
    Live(LiveBookmark),
    Evicted(Eviction),
}

fn partition(rows: Vec<(Bookmark, Option<VideoRecord>)>, now: DateTime<Utc>) -> Vec<Entry> {
    rows.into_iter()
        .map(|(bookmark, video)| match (bookmark.state(now), video) {
            (BookmarkState::Expired, _) => Entry::Evicted(Eviction {
                bookmark,
                reason: EvictionReason::Expired,
            }),
            (BookmarkState::Live { .. }, None) => Entry::Evicted(Eviction {
                bookmark,
                reason: EvictionReason::Dangling,
            }),
            (BookmarkState::Live { remaining }, Some(video)) => Entry::Live(LiveBookmark {
                bookmark,
                video,
                remaining,
            }),
        })
        .collect()
}
