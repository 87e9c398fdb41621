//! Administrative operations.
//!
//! Authority comes from an immutable [`AdminSet`] handed in at startup.
//! Every operation takes an [`Operator`], which can only be obtained by
//! authorizing a caller against that set (or by the local CLI operator).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Category, PremiumWindow, UserId};
use crate::library::ContentStore;
use crate::store::{settings, users, Database, StoreError};

use super::entitlement::{EntitlementError, EntitlementManager};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("User {0} is not an administrator")]
    NotAuthorized(UserId),

    #[error(transparent)]
    Entitlement(#[from] EntitlementError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Identities allowed to run admin operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminSet(BTreeSet<UserId>);

impl AdminSet {
    pub fn new(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self(ids.into_iter().collect())
    }

    /// Parse a comma separated id list (`ADMIN_IDS`)
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let mut ids = BTreeSet::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let id = part
                .parse::<UserId>()
                .map_err(|_| anyhow::anyhow!("Invalid admin id: {}", part))?;
            ids.insert(id);
        }
        Ok(Self(ids))
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.0.contains(&user_id)
    }

    pub fn authorize(&self, caller: UserId) -> Result<Operator, AdminError> {
        if self.contains(caller) {
            Ok(Operator {
                caller: Some(caller),
            })
        } else {
            warn!(caller, "Rejected admin command");
            Err(AdminError::NotAuthorized(caller))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = UserId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Proof that the caller may run admin operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    caller: Option<UserId>,
}

impl Operator {
    /// Whoever runs the CLI against the data directory
    pub fn local() -> Self {
        Self { caller: None }
    }

    /// The authorized chat user, `None` for the local operator
    pub fn caller(&self) -> Option<UserId> {
        self.caller
    }
}

/// Library and audience figures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_users: u64,
    pub premium_users: u64,
    pub counts_by_category: BTreeMap<Category, u64>,
    /// Highest ingested message per channel
    pub cursors: BTreeMap<i64, i64>,
}

impl Stats {
    pub fn total_videos(&self) -> u64 {
        self.counts_by_category.values().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BotSettings {
    pub forward_protection: bool,
}

#[derive(Clone)]
pub struct AdminService {
    db: Database,
    content: ContentStore,
    entitlement: EntitlementManager,
}

impl AdminService {
    pub fn new(content: ContentStore) -> Self {
        let db = content.database().clone();
        Self {
            entitlement: EntitlementManager::new(db.clone()),
            content,
            db,
        }
    }

    pub fn grant_premium(
        &self,
        op: Operator,
        user_id: UserId,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<PremiumWindow, AdminError> {
        let window = self.entitlement.grant(user_id, days, now)?;
        info!(by = ?op.caller(), user_id, days, "Admin granted premium");
        Ok(window)
    }

    pub fn revoke_premium(&self, op: Operator, user_id: UserId) -> Result<(), AdminError> {
        self.entitlement.revoke(user_id)?;
        info!(by = ?op.caller(), user_id, "Admin revoked premium");
        Ok(())
    }

    pub fn stats(&self, _op: Operator, now: DateTime<Utc>) -> Result<Stats, AdminError> {
        let (total_users, premium_users) = self.db.with_conn(|conn| {
            Ok::<_, StoreError>((users::count(conn)?, users::count_premium_active(conn, now)?))
        })?;

        Ok(Stats {
            total_users,
            premium_users,
            counts_by_category: self.content.count_by_category()?,
            cursors: self.content.cursors()?,
        })
    }

    pub fn settings(&self, _op: Operator) -> Result<BotSettings, AdminError> {
        let forward_protection = self
            .db
            .with_conn(|conn| settings::get::<bool>(conn, settings::FORWARD_PROTECTION))?
            .unwrap_or(false);
        Ok(BotSettings { forward_protection })
    }

    /// Flip forward protection, returning the new value
    pub fn toggle_forward_protection(&self, op: Operator, now: DateTime<Utc>) -> Result<bool, AdminError> {
        let enabled = self.db.with_tx(|tx| {
            let current = settings::get::<bool>(tx, settings::FORWARD_PROTECTION)?.unwrap_or(false);
            settings::set(tx, settings::FORWARD_PROTECTION, &!current, now)?;
            Ok::<_, StoreError>(!current)
        })?;

        info!(by = ?op.caller(), enabled, "Forward protection toggled");
        Ok(enabled)
    }

    /// Everyone who ever contacted the bot
    pub fn broadcast_targets(&self, _op: Operator) -> Result<Vec<UserId>, AdminError> {
        Ok(self.db.with_conn(users::all_ids)?)
    }
}
