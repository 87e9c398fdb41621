//! Premium windows.
//!
//! Entitlement is evaluated at the moment of use from the stored window;
//! nothing caches it beyond a single request. An expired window behaves
//! exactly like no window, whether or not `sweep` has cleared it yet.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::domain::{EntitlementStatus, PremiumWindow, UserId};
use crate::store::{users, Database, StoreError};

/// Longest grant accepted in one call
pub const MAX_GRANT_DAYS: i64 = 3650;

#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("User not found: {0}")]
    UnknownUser(UserId),

    #[error("Premium duration must be between 1 and {} days, got {days}", MAX_GRANT_DAYS)]
    InvalidDuration { days: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Grants, revokes, and evaluates premium windows
#[derive(Clone)]
pub struct EntitlementManager {
    db: Database,
}

impl EntitlementManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Set the window to `[now, now + days)`.
    ///
    /// Any remaining time from an earlier grant is discarded.
    pub fn grant(&self, user_id: UserId, days: i64, now: DateTime<Utc>) -> Result<PremiumWindow, EntitlementError> {
        if !(1..=MAX_GRANT_DAYS).contains(&days) {
            return Err(EntitlementError::InvalidDuration { days });
        }

        let window = PremiumWindow::starting(now, days as u32);
        let updated = self.db.with_conn(|conn| users::set_premium(conn, user_id, Some(&window)))?;
        if !updated {
            return Err(EntitlementError::UnknownUser(user_id));
        }

        info!(user_id, days, expires_at = %window.expires_at, "Premium granted");
        Ok(window)
    }

    /// Clear the window immediately
    pub fn revoke(&self, user_id: UserId) -> Result<(), EntitlementError> {
        let updated = self.db.with_conn(|conn| users::set_premium(conn, user_id, None))?;
        if !updated {
            return Err(EntitlementError::UnknownUser(user_id));
        }

        info!(user_id, "Premium revoked");
        Ok(())
    }

    pub fn status(&self, user_id: UserId, now: DateTime<Utc>) -> Result<EntitlementStatus, EntitlementError> {
        let user = self.db.with_conn(|conn| users::get(conn, user_id))?;
        Ok(user.map_or(EntitlementStatus::Free, |u| u.entitlement(now)))
    }

    /// True iff a window exists and `now` is before its expiry
    pub fn is_active(&self, user_id: UserId, now: DateTime<Utc>) -> Result<bool, EntitlementError> {
        Ok(self.status(user_id, now)?.is_active())
    }

    pub fn count_active(&self, now: DateTime<Utc>) -> Result<u64, EntitlementError> {
        Ok(self.db.with_conn(|conn| users::count_premium_active(conn, now))?)
    }

    /// Clear windows that ran out. Reads give the same answer without this.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<usize, EntitlementError> {
        Ok(self.db.with_conn(|conn| users::clear_expired_premium(conn, now))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;
    use chrono::{Duration, TimeZone};

    fn setup() -> (EntitlementManager, DateTime<Utc>) {
        let db = Database::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap();
        db.with_conn(|conn| users::insert_if_absent(conn, &User::new(1, now)))
            .unwrap();
        (EntitlementManager::new(db), now)
    }

    #[test]
    fn test_regrant_resets_from_now() {
        let (manager, now) = setup();

        manager.grant(1, 5, now).unwrap();
        let window = manager.grant(1, 3, now).unwrap();

        assert_eq!(window.expires_at, now + Duration::days(3));
        assert!(manager.is_active(1, now + Duration::days(2)).unwrap());
        assert!(!manager.is_active(1, now + Duration::days(4)).unwrap());
    }

    #[test]
    fn test_invalid_duration_and_unknown_user() {
        let (manager, now) = setup();

        assert!(matches!(
            manager.grant(1, 0, now),
            Err(EntitlementError::InvalidDuration { days: 0 })
        ));
        assert!(matches!(
            manager.grant(2, 1, now),
            Err(EntitlementError::UnknownUser(2))
        ));
        assert!(matches!(manager.revoke(2), Err(EntitlementError::UnknownUser(2))));
    }

    #[test]
    fn test_revoke_and_missing_user_is_free() {
        let (manager, now) = setup();

        manager.grant(1, 30, now).unwrap();
        manager.revoke(1).unwrap();
        assert_eq!(manager.status(1, now).unwrap(), EntitlementStatus::Free);
        assert!(!manager.is_active(99, now).unwrap());
    }

    #[test]
    fn test_sweep_agrees_with_lazy_reads() {
        let (manager, now) = setup();
        manager.grant(1, 1, now).unwrap();

        let later = now + Duration::days(1);
        assert!(!manager.is_active(1, later).unwrap());
        assert_eq!(manager.count_active(later).unwrap(), 0);

        assert_eq!(manager.sweep(later).unwrap(), 1);
        assert!(!manager.is_active(1, later).unwrap());
        assert_eq!(manager.status(1, later).unwrap(), EntitlementStatus::Free);
    }
}
