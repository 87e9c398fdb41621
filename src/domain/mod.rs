//! Domain types for reelbot.
//!
//! This module contains the core data structures:
//! - Category/Selection: what a user browses
//! - VideoRecord: immutable library entries
//! - User/PremiumWindow: session cursor and entitlement
//! - Bookmark: temporary, bounded saves
//! - ContentPosted: ingestion events

pub mod bookmark;
pub mod category;
pub mod events;
pub mod user;
pub mod video;

// Re-export commonly used types
pub use bookmark::{bookmark_ttl, Bookmark, BookmarkState, BOOKMARK_LIMIT};
pub use category::{Category, Selection, UnknownCategory};
pub use events::ContentPosted;
pub use user::{EntitlementStatus, PremiumWindow, User, UserId};
pub use video::{NewVideo, SourceRef, VideoId, VideoRecord};
