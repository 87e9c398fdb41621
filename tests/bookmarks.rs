//! Bookmark Integration Tests
//!
//! The five-bookmark limit and the ten-minute visibility boundary, checked
//! both through lazy listing and through sweeps.

use chrono::{DateTime, Duration, TimeZone, Utc};
use reelbot::core::{BookmarkError, BookmarkManager, BookmarkOutcome, EvictionReason};
use reelbot::domain::{Category, NewVideo, SourceRef, VideoId};
use reelbot::library::ContentStore;
use reelbot::store::Database;
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap()
}

fn seed(db: &Database, count: i64) -> Vec<VideoId> {
    let content = ContentStore::new(db.clone());
    for seq in 1..=count {
        content
            .insert_if_absent(
                &NewVideo {
                    category: Category::Four,
                    source: SourceRef::new(-4, seq),
                    file_id: format!("v{}", seq),
                    caption: None,
                    file_name: None,
                    file_size: 0,
                },
                t0(),
            )
            .unwrap();
    }
    (0..count as u64)
        .map(|i| content.video_at(Category::Four, i).unwrap().unwrap().id)
        .collect()
}

#[test]
fn test_never_more_than_five_live() {
    let db = Database::open_in_memory().unwrap();
    let ids = seed(&db, 8);
    let manager = BookmarkManager::new(db);

    for (i, id) in ids.iter().enumerate() {
        let at = t0() + Duration::seconds(i as i64);
        let result = manager.add(1, *id, at);
        if i < 5 {
            assert!(matches!(result, Ok(BookmarkOutcome::Added(_))));
        } else {
            assert!(matches!(result, Err(BookmarkError::LimitExceeded { limit: 5 })));
        }
        assert!(manager.list(1, at).unwrap().live.len() <= 5);
    }

    // The rejected attempts created nothing
    let listing = manager.list(1, t0() + Duration::seconds(10)).unwrap();
    let listed: Vec<VideoId> = listing.live.iter().map(|b| b.video.id).collect();
    assert_eq!(listed.len(), 5);
    assert!(!listed.contains(&ids[5]));

    // Other users have their own budget
    assert!(matches!(manager.add(2, ids[7], t0()), Ok(BookmarkOutcome::Added(_))));
}

#[test]
fn test_list_is_newest_first() {
    let db = Database::open_in_memory().unwrap();
    let ids = seed(&db, 3);
    let manager = BookmarkManager::new(db);

    for (i, id) in ids.iter().enumerate() {
        manager.add(1, *id, t0() + Duration::seconds(i as i64)).unwrap();
    }

    let listed: Vec<VideoId> = manager
        .list(1, t0() + Duration::seconds(5))
        .unwrap()
        .live
        .iter()
        .map(|b| b.video.id)
        .collect();
    assert_eq!(listed, vec![ids[2], ids[1], ids[0]]);
}

#[test]
fn test_ten_minute_boundary_lazy() {
    let db = Database::open_in_memory().unwrap();
    let ids = seed(&db, 1);
    let manager = BookmarkManager::new(db);
    manager.add(1, ids[0], t0()).unwrap();

    let just_before = t0() + Duration::minutes(10) - Duration::seconds(1);
    let listing = manager.list(1, just_before).unwrap();
    assert_eq!(listing.live.len(), 1);
    assert_eq!(listing.live[0].remaining, Duration::seconds(1));

    let listing = manager.list(1, t0() + Duration::minutes(10)).unwrap();
    assert!(listing.live.is_empty());
    assert_eq!(listing.evicted.len(), 1);
    assert_eq!(listing.evicted[0].reason, EvictionReason::Expired);
}

#[test]
fn test_ten_minute_boundary_swept() {
    let db = Database::open_in_memory().unwrap();
    let ids = seed(&db, 2);
    let manager = BookmarkManager::new(db);
    manager.add(1, ids[0], t0()).unwrap();
    manager.add(1, ids[1], t0() + Duration::seconds(30)).unwrap();

    // One second short of expiry: sweeping removes nothing
    let before = t0() + Duration::minutes(10) - Duration::seconds(1);
    assert_eq!(manager.sweep(before).unwrap(), 0);
    assert_eq!(manager.list(1, before).unwrap().live.len(), 2);

    // At the boundary the first one goes, exactly as a lazy read would decide
    let boundary = t0() + Duration::minutes(10);
    assert_eq!(manager.sweep(boundary).unwrap(), 1);
    let listing = manager.list(1, boundary).unwrap();
    assert_eq!(listing.live.len(), 1);
    assert_eq!(listing.live[0].video.id, ids[1]);
    assert!(listing.evicted.is_empty());
}

#[test]
fn test_bookmarks_persist_on_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("reelbot.db");

    let ids = {
        let db = Database::open(&path).unwrap();
        let ids = seed(&db, 1);
        BookmarkManager::new(db).add(1, ids[0], t0()).unwrap();
        ids
    };

    let manager = BookmarkManager::new(Database::open(&path).unwrap());
    let listing = manager.list(1, t0() + Duration::minutes(1)).unwrap();
    assert_eq!(listing.live.len(), 1);
    assert_eq!(listing.live[0].video.id, ids[0]);
}
