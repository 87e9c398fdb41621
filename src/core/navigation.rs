//! Per-user browsing cursor.
//!
//! States are the four categories plus mix mode; only `set_category`
//! changes state. `next`/`previous` move within the state: in a category
//! they step through append order and wrap at both ends, in mix mode they
//! draw from a non-empty category chosen by the configured [`MixStrategy`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{Category, Selection, User, UserId, VideoRecord};
use crate::library::ContentStore;
use crate::store::{users, Database, StoreError};

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("No videos available in {0}")]
    NoContentAvailable(Selection),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How mix mode picks what to show next
pub trait MixStrategy: Send + Sync {
    /// Pick one of the non-empty categories (given with their sizes)
    fn choose_category(&self, available: &[(Category, u64)]) -> Option<Category>;

    /// Pick a video within the chosen category
    fn choose_video(&self, store: &ContentStore, category: Category) -> Result<Option<VideoRecord>, StoreError> {
        store.random_video(category)
    }
}

/// Uniformly random category, uniformly random video
#[derive(Debug, Default)]
pub struct UniformRandom;

impl MixStrategy for UniformRandom {
    fn choose_category(&self, available: &[(Category, u64)]) -> Option<Category> {
        available.choose(&mut rand::thread_rng()).map(|(c, _)| *c)
    }
}

/// Cycles through the non-empty categories, and through each category's
/// videos in order. Deterministic.
#[derive(Debug, Default)]
pub struct RoundRobin {
    turn: AtomicU64,
    served: [AtomicU64; 4],
}

impl MixStrategy for RoundRobin {
    fn choose_category(&self, available: &[(Category, u64)]) -> Option<Category> {
        if available.is_empty() {
            return None;
        }
        let turn = self.turn.fetch_add(1, Ordering::Relaxed);
        Some(available[(turn % available.len() as u64) as usize].0)
    }

    fn choose_video(&self, store: &ContentStore, category: Category) -> Result<Option<VideoRecord>, StoreError> {
        let index = self.served[category.number() as usize - 1].fetch_add(1, Ordering::Relaxed);
        store.video_at(category, index)
    }
}

/// Configured mix strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixStrategyKind {
    #[default]
    Uniform,
    RoundRobin,
}

impl MixStrategyKind {
    pub fn build(self) -> Arc<dyn MixStrategy> {
        match self {
            MixStrategyKind::Uniform => Arc::new(UniformRandom),
            MixStrategyKind::RoundRobin => Arc::new(RoundRobin::default()),
        }
    }
}

impl std::str::FromStr for MixStrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "uniform" | "random" => Ok(MixStrategyKind::Uniform),
            "round_robin" | "round-robin" | "roundrobin" => Ok(MixStrategyKind::RoundRobin),
            _ => anyhow::bail!("Unknown mix strategy: {}", s),
        }
    }
}

/// Computes what each user sees next and persists their cursor
#[derive(Clone)]
pub struct NavigationEngine {
    db: Database,
    content: ContentStore,
    mix: Arc<dyn MixStrategy>,
}

impl NavigationEngine {
    pub fn new(content: ContentStore, mix: Arc<dyn MixStrategy>) -> Self {
        Self {
            db: content.database().clone(),
            content,
            mix,
        }
    }

    /// Load a user, creating the initial state on first contact.
    ///
    /// The flag is true when the user was created by this call.
    pub fn enter(&self, user_id: UserId, now: DateTime<Utc>) -> Result<(User, bool), NavigationError> {
        let result = self.db.with_conn(|conn| {
            let created = users::insert_if_absent(conn, &User::new(user_id, now))?;
            let user = users::get(conn, user_id)?;
            Ok::<_, StoreError>((user, created))
        })?;

        match result {
            (Some(user), created) => Ok((user, created)),
            // Row vanished between insert and read; users are never deleted
            (None, _) => Ok((User::new(user_id, now), true)),
        }
    }

    /// The video the user is looking at, without counting a watch
    pub fn current(&self, user: &mut User) -> Result<VideoRecord, NavigationError> {
        let shown = match user.last_video {
            Some(id) => self
                .content
                .get(id)?
                .filter(|v| user.selection.category().map_or(true, |c| c == v.category)),
            None => None,
        };

        let video = match (shown, user.selection) {
            (Some(video), _) => video,
            (None, Selection::Category(category)) => {
                let (index, video) = self.locate(category, user.position.unwrap_or(0))?;
                user.position = Some(index);
                video
            }
            (None, Selection::Mix) => self.draw()?,
        };

        self.show(user, &video)?;
        Ok(video)
    }

    /// Advance and count a watch
    pub fn next(&self, user: &mut User) -> Result<VideoRecord, NavigationError> {
        let video = match user.selection {
            Selection::Category(category) => {
                let target = user.position.map_or(0, |p| p + 1);
                let (index, video) = self.locate(category, target)?;
                user.position = Some(index);
                video
            }
            Selection::Mix => self.draw()?,
        };

        user.watch_count += 1;
        self.show(user, &video)?;
        debug!(user_id = user.id, video_id = video.id, position = ?user.position, "Advanced");
        Ok(video)
    }

    /// Step back; does not count a watch
    pub fn previous(&self, user: &mut User) -> Result<VideoRecord, NavigationError> {
        let video = match user.selection {
            Selection::Category(category) => {
                let len = self.content.count(category)?;
                if len == 0 {
                    return Err(NavigationError::NoContentAvailable(user.selection));
                }
                let target = match user.position {
                    None => len - 1,
                    Some(p) => (p % len + len - 1) % len,
                };
                let (index, video) = self.locate(category, target)?;
                user.position = Some(index);
                video
            }
            Selection::Mix => self.draw()?,
        };

        self.show(user, &video)?;
        Ok(video)
    }

    /// Switch category or enter mix mode; resets the cursor to the start
    pub fn set_category(&self, user: &mut User, selection: Selection) -> Result<(), NavigationError> {
        user.selection = selection;
        user.position = None;
        user.last_video = None;
        self.db.with_conn(|conn| users::update_navigation(conn, user))?;
        debug!(user_id = user.id, %selection, "Selection changed");
        Ok(())
    }

    fn show(&self, user: &mut User, video: &VideoRecord) -> Result<(), NavigationError> {
        user.last_video = Some(video.id);
        self.db.with_conn(|conn| users::update_navigation(conn, user))?;
        Ok(())
    }

    /// Video at `index` modulo the category size, with the normalized index
    fn locate(&self, category: Category, index: u64) -> Result<(u64, VideoRecord), NavigationError> {
        let empty = NavigationError::NoContentAvailable(Selection::Category(category));

        let len = self.content.count(category)?;
        if len == 0 {
            return Err(empty);
        }
        let index = index % len;
        let video = self.content.video_at(category, index)?.ok_or(empty)?;
        Ok((index, video))
    }

    fn draw(&self) -> Result<VideoRecord, NavigationError> {
        let available: Vec<(Category, u64)> = self
            .content
            .count_by_category()?
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .collect();

        let category = self
            .mix
            .choose_category(&available)
            .ok_or(NavigationError::NoContentAvailable(Selection::Mix))?;

        self.mix
            .choose_video(&self.content, category)?
            .ok_or(NavigationError::NoContentAvailable(Selection::Mix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_cycles_available() {
        let strategy = RoundRobin::default();
        let available = [(Category::Two, 1), (Category::Three, 4)];

        let picks: Vec<Category> = (0..4)
            .filter_map(|_| strategy.choose_category(&available))
            .collect();
        assert_eq!(
            picks,
            vec![Category::Two, Category::Three, Category::Two, Category::Three]
        );
        assert_eq!(strategy.choose_category(&[]), None);
    }

    #[test]
    fn test_uniform_never_picks_outside_available() {
        let strategy = UniformRandom;
        let available = [(Category::One, 3)];
        for _ in 0..20 {
            assert_eq!(strategy.choose_category(&available), Some(Category::One));
        }
    }

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!("round-robin".parse::<MixStrategyKind>().unwrap(), MixStrategyKind::RoundRobin);
        assert_eq!("uniform".parse::<MixStrategyKind>().unwrap(), MixStrategyKind::Uniform);
        assert!("weighted".parse::<MixStrategyKind>().is_err());
    }
}
