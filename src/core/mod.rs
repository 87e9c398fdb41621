//! Core bot logic.
//!
//! This module contains:
//! - Entitlement: premium windows
//! - Bookmarks: bounded, expiring per-user bookmarks
//! - Navigation: per-user browsing cursor and mix strategies
//! - Session: action → response orchestration under per-user locks
//! - Admin: operator-gated administration

pub mod admin;
pub mod bookmarks;
pub mod entitlement;
pub mod locks;
pub mod navigation;
pub mod session;

// Re-export commonly used types
pub use admin::{AdminError, AdminService, AdminSet, BotSettings, Operator, Stats};
pub use bookmarks::{BookmarkError, BookmarkListing, BookmarkManager, BookmarkOutcome, EvictionReason};
pub use entitlement::{EntitlementError, EntitlementManager, MAX_GRANT_DAYS};
pub use locks::UserLocks;
pub use navigation::{MixStrategy, MixStrategyKind, NavigationEngine, NavigationError, RoundRobin, UniformRandom};
pub use session::{Action, DownloadView, ErrorKind, Menu, Notice, Response, SessionError, SessionOrchestrator, VideoView};
