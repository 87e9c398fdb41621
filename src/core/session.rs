//! Session orchestrator.
//!
//! Resolves one user action into one response. Every action for a user runs
//! under that user's lock, so a user's cursor, bookmarks and votes change
//! strictly one action at a time while other users proceed in parallel.
//!
//! First contact and empty categories are ordinary outcomes here: the former
//! creates the user, the latter renders as [`Response::Empty`]. Only storage
//! failures surface as `Err`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, instrument, Span};

use crate::domain::{EntitlementStatus, Selection, User, UserId, VideoRecord, BOOKMARK_LIMIT};
use crate::library::ContentStore;
use crate::store::{settings, votes, Database, StoreError};

use super::bookmarks::{BookmarkError, BookmarkManager, BookmarkOutcome, Eviction, LiveBookmark};
use super::entitlement::{EntitlementError, EntitlementManager};
use super::locks::UserLocks;
use super::navigation::{MixStrategy, NavigationEngine, NavigationError};

/// What a user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    GetVideo,
    Next,
    Previous,
    /// Open the category picker
    ChooseCategory,
    SwitchCategory(Selection),
    Bookmark,
    ListBookmarks,
    Status,
    Like,
    Dislike,
    Download,
    MainMenu,
}

/// Which navigation controls make sense next to a video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavAffordances {
    pub next: bool,
    pub previous: bool,
    pub bookmark: bool,
    pub switch_category: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoView {
    pub video: VideoRecord,
    pub caption: String,
    pub selection: Selection,
    pub nav: NavAffordances,
    /// Evaluated at the moment the view was built
    pub download_allowed: bool,
    /// Mark the outgoing message as non-forwardable
    pub protect_content: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub user_id: UserId,
    pub selection: Selection,
    pub watch_count: u64,
    pub entitlement: EntitlementStatus,
    pub live_bookmarks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkView {
    pub live: Vec<LiveBookmark>,
    /// Dropped during this listing
    pub evicted: Vec<Eviction>,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    BookmarkAdded { slots_left: usize },
    AlreadyBookmarked,
    VoteRecorded { liked: bool, approval_percent: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    Main { first_contact: bool, premium: bool },
    Categories { current: Selection },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No current video, or it no longer exists
    NotFound,
    LimitExceeded { limit: usize },
    PremiumRequired,
}

/// A premium download, sent as a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadView {
    pub video: VideoRecord,
    pub protect_content: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Video(VideoView),
    Status(StatusView),
    Bookmarks(BookmarkView),
    Notice(Notice),
    /// Premium download of the current video
    Download(DownloadView),
    Menu(Menu),
    /// Nothing to show in this selection yet
    Empty(Selection),
    Error(ErrorKind),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Bookmark(#[from] BookmarkError),

    #[error(transparent)]
    Entitlement(#[from] EntitlementError),

    #[error("Session worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Caption shown under every video
pub fn video_caption(video: &VideoRecord, approval_percent: u8) -> String {
    format!(
        "Video ID: {}\n{}% users liked this",
        video.short_code(),
        approval_percent
    )
}

/// Composes navigation, content, bookmarks and entitlement per action
#[derive(Clone)]
pub struct SessionOrchestrator {
    db: Database,
    content: ContentStore,
    navigation: NavigationEngine,
    bookmarks: BookmarkManager,
    entitlement: EntitlementManager,
    locks: UserLocks,
}

impl SessionOrchestrator {
    pub fn new(content: ContentStore, mix: Arc<dyn MixStrategy>) -> Self {
        let db = content.database().clone();
        Self {
            navigation: NavigationEngine::new(content.clone(), mix),
            bookmarks: BookmarkManager::new(db.clone()),
            entitlement: EntitlementManager::new(db.clone()),
            locks: UserLocks::new(),
            content,
            db,
        }
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    pub fn bookmarks(&self) -> &BookmarkManager {
        &self.bookmarks
    }

    pub fn entitlement(&self) -> &EntitlementManager {
        &self.entitlement
    }

    pub async fn handle(&self, user_id: UserId, action: Action) -> Result<Response, SessionError> {
        self.handle_at(user_id, action, Utc::now()).await
    }

    /// Handle `action` as of `now`
    #[instrument(skip(self, now))]
    pub async fn handle_at(
        &self,
        user_id: UserId,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<Response, SessionError> {
        let _guard = self.locks.acquire(user_id).await;

        // SQLite calls block, so the action runs on the blocking pool
        let this = self.clone();
        let span = Span::current();
        tokio::task::spawn_blocking(move || span.in_scope(|| this.apply(user_id, action, now))).await?
    }

    fn apply(&self, user_id: UserId, action: Action, now: DateTime<Utc>) -> Result<Response, SessionError> {
        let (mut user, first_contact) = self.navigation.enter(user_id, now)?;
        if first_contact {
            debug!("First contact");
        }

        match action {
            Action::Start | Action::MainMenu => Ok(Response::Menu(Menu::Main {
                first_contact,
                premium: user.entitlement(now).is_active(),
            })),

            Action::ChooseCategory => Ok(Response::Menu(Menu::Categories {
                current: user.selection,
            })),

            Action::GetVideo => {
                let shown = self.navigation.current(&mut user);
                self.present(&user, shown, now)
            }

            Action::Next => {
                let shown = self.navigation.next(&mut user);
                self.present(&user, shown, now)
            }

            Action::Previous => {
                let shown = self.navigation.previous(&mut user);
                self.present(&user, shown, now)
            }

            Action::SwitchCategory(selection) => {
                self.navigation.set_category(&mut user, selection)?;
                let shown = self.navigation.current(&mut user);
                self.present(&user, shown, now)
            }

            Action::Bookmark => self.bookmark(&user, now),

            Action::ListBookmarks => {
                let listing = self.bookmarks.list(user.id, now)?;
                Ok(Response::Bookmarks(BookmarkView {
                    live: listing.live,
                    evicted: listing.evicted,
                    limit: BOOKMARK_LIMIT,
                }))
            }

            Action::Status => {
                let live_bookmarks = self.bookmarks.list(user.id, now)?.live.len();
                Ok(Response::Status(StatusView {
                    user_id: user.id,
                    selection: user.selection,
                    watch_count: user.watch_count,
                    entitlement: user.entitlement(now),
                    live_bookmarks,
                }))
            }

            Action::Like => self.vote(&user, true, now),
            Action::Dislike => self.vote(&user, false, now),

            Action::Download => {
                if !self.entitlement.is_active(user.id, now)? {
                    return Ok(Response::Error(ErrorKind::PremiumRequired));
                }
                match self.current_video(&user)? {
                    Some(video) => Ok(Response::Download(DownloadView {
                        video,
                        protect_content: self.forward_protection()?,
                    })),
                    None => Ok(Response::Error(ErrorKind::NotFound)),
                }
            }
        }
    }

    fn present(
        &self,
        user: &User,
        shown: Result<VideoRecord, NavigationError>,
        now: DateTime<Utc>,
    ) -> Result<Response, SessionError> {
        let video = match shown {
            Ok(video) => video,
            Err(NavigationError::NoContentAvailable(selection)) => {
                return Ok(Response::Empty(selection));
            }
            Err(e) => return Err(e.into()),
        };

        let approval = self.db.with_conn(|conn| votes::approval_percent(conn, video.id))?;
        let protect_content = self.forward_protection()?;

        let browsable = match user.selection {
            Selection::Category(category) => self.content.count(category)?,
            Selection::Mix => self.content.count_by_category()?.values().sum(),
        };

        Ok(Response::Video(VideoView {
            caption: video_caption(&video, approval),
            selection: user.selection,
            nav: NavAffordances {
                next: browsable > 1,
                previous: browsable > 1,
                bookmark: true,
                switch_category: true,
            },
            download_allowed: self.entitlement.is_active(user.id, now)?,
            protect_content,
            video,
        }))
    }

    fn bookmark(&self, user: &User, now: DateTime<Utc>) -> Result<Response, SessionError> {
        let Some(video_id) = user.last_video else {
            return Ok(Response::Error(ErrorKind::NotFound));
        };

        match self.bookmarks.add(user.id, video_id, now) {
            Ok(BookmarkOutcome::Added(_)) => {
                let live = self.bookmarks.list(user.id, now)?.live.len();
                Ok(Response::Notice(Notice::BookmarkAdded {
                    slots_left: BOOKMARK_LIMIT.saturating_sub(live),
                }))
            }
            Ok(BookmarkOutcome::AlreadyBookmarked(_)) => Ok(Response::Notice(Notice::AlreadyBookmarked)),
            Err(BookmarkError::LimitExceeded { limit }) => Ok(Response::Error(ErrorKind::LimitExceeded { limit })),
            Err(BookmarkError::VideoNotFound(_)) => Ok(Response::Error(ErrorKind::NotFound)),
            Err(e) => Err(e.into()),
        }
    }

    fn vote(&self, user: &User, liked: bool, now: DateTime<Utc>) -> Result<Response, SessionError> {
        let Some(video) = self.current_video(user)? else {
            return Ok(Response::Error(ErrorKind::NotFound));
        };

        let approval_percent = self.db.with_tx(|tx| {
            votes::upsert(tx, user.id, video.id, liked, now)?;
            votes::approval_percent(tx, video.id)
        })?;

        debug!(video_id = video.id, liked, approval_percent, "Vote recorded");
        Ok(Response::Notice(Notice::VoteRecorded {
            liked,
            approval_percent,
        }))
    }

    fn forward_protection(&self) -> Result<bool, StoreError> {
        self.db
            .with_conn(|conn| settings::get::<bool>(conn, settings::FORWARD_PROTECTION))
            .map(|on| on.unwrap_or(false))
    }

    fn current_video(&self, user: &User) -> Result<Option<VideoRecord>, StoreError> {
        match user.last_video {
            Some(id) => self.content.get(id),
            None => Ok(None),
        }
    }
}
