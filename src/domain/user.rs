//! Users, their browsing cursor, and premium windows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::category::Selection;
use super::video::VideoId;

/// Telegram user id
pub type UserId = i64;

/// A time range during which a user holds premium privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumWindow {
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PremiumWindow {
    /// A window of `days` starting at `now`.
    ///
    /// Granting again replaces the window; remaining time is not carried over.
    pub fn starting(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            started_at: now,
            expires_at: now + Duration::days(days as i64),
        }
    }

    /// Evaluate the window at `now`
    pub fn status(&self, now: DateTime<Utc>) -> EntitlementStatus {
        if now < self.expires_at {
            EntitlementStatus::Active {
                expires_at: self.expires_at,
            }
        } else {
            EntitlementStatus::Expired {
                expired_at: self.expires_at,
            }
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status(now).is_active()
    }
}

/// Entitlement as seen at a single instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntitlementStatus {
    /// No window was ever granted, or it was revoked
    Free,

    Active { expires_at: DateTime<Utc> },

    /// A window exists but has run out; treated exactly like `Free`
    Expired { expired_at: DateTime<Utc> },
}

impl EntitlementStatus {
    pub fn of(window: Option<&PremiumWindow>, now: DateTime<Utc>) -> Self {
        window.map_or(EntitlementStatus::Free, |w| w.status(now))
    }

    pub fn is_active(&self) -> bool {
        matches!(self, EntitlementStatus::Active { .. })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            EntitlementStatus::Active { expires_at } => Some(*expires_at),
            _ => None,
        }
    }
}

/// Per-user session and entitlement state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Category or mix mode being browsed
    pub selection: Selection,

    /// Index within the category; `None` until the first video is shown
    pub position: Option<u64>,

    /// Video most recently shown to the user
    pub last_video: Option<VideoId>,

    /// Forward advances made, across all categories
    pub watch_count: u64,

    pub premium: Option<PremiumWindow>,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Initial state on first contact: category 1, at the start
    pub fn new(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            selection: Selection::default(),
            position: None,
            last_video: None,
            watch_count: 0,
            premium: None,
            created_at: now,
        }
    }

    pub fn entitlement(&self, now: DateTime<Utc>) -> EntitlementStatus {
        EntitlementStatus::of(self.premium.as_ref(), now)
    }
}
