//! Session Integration Tests
//!
//! End-to-end action handling: first contact, empty states, entitlement
//! gating, bookmarks, votes, and per-user serialization.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, TimeZone, Utc};
use reelbot::core::session::StatusView;
use reelbot::core::{
    Action, AdminService, DownloadView, ErrorKind, Menu, Notice, Operator, Response, RoundRobin, SessionOrchestrator,
    UniformRandom, VideoView,
};
use reelbot::domain::{Category, EntitlementStatus, NewVideo, Selection, SourceRef};
use reelbot::library::ContentStore;
use reelbot::store::{Database, StoreError};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 18, 0, 0).unwrap()
}

fn seed(content: &ContentStore, category: Category, count: i64) {
    let channel_id = -(category.number() as i64);
    for seq in 1..=count {
        content
            .insert_if_absent(
                &NewVideo {
                    category,
                    source: SourceRef::new(channel_id, seq),
                    file_id: format!("c{}-{}", category.number(), seq),
                    caption: None,
                    file_name: None,
                    file_size: 0,
                },
                t0(),
            )
            .unwrap();
    }
}

fn setup() -> (SessionOrchestrator, AdminService, ContentStore) {
    let content = ContentStore::new(Database::open_in_memory().unwrap());
    let session = SessionOrchestrator::new(content.clone(), Arc::new(UniformRandom));
    (session, AdminService::new(content.clone()), content)
}

fn expect_video(response: Response) -> VideoView {
    match response {
        Response::Video(view) => view,
        other => panic!("expected a video, got {:?}", other),
    }
}

#[tokio::test]
async fn test_first_contact_is_a_normal_response() {
    let (session, _, _) = setup();

    let first = session.handle_at(1, Action::Start, t0()).await.unwrap();
    assert_eq!(
        first,
        Response::Menu(Menu::Main {
            first_contact: true,
            premium: false
        })
    );

    let again = session.handle_at(1, Action::Start, t0()).await.unwrap();
    assert_eq!(
        again,
        Response::Menu(Menu::Main {
            first_contact: false,
            premium: false
        })
    );
}

#[tokio::test]
async fn test_empty_library_gives_empty_state() {
    let (session, _, _) = setup();

    // First ever action of this user is a navigation request
    let response = session.handle_at(5, Action::GetVideo, t0()).await.unwrap();
    assert_eq!(response, Response::Empty(Selection::Category(Category::One)));

    let response = session
        .handle_at(5, Action::SwitchCategory(Selection::Mix), t0())
        .await
        .unwrap();
    assert_eq!(response, Response::Empty(Selection::Mix));
}

#[tokio::test]
async fn test_free_user_sees_download_disallowed() {
    let (session, _, content) = setup();
    seed(&content, Category::One, 2);

    let view = expect_video(session.handle_at(1, Action::GetVideo, t0()).await.unwrap());
    assert!(!view.download_allowed);
    assert_eq!(
        view.caption,
        format!("Video ID: {}\n77% users liked this", view.video.short_code())
    );
    assert!(view.nav.next && view.nav.previous);

    let response = session.handle_at(1, Action::Download, t0()).await.unwrap();
    assert_eq!(response, Response::Error(ErrorKind::PremiumRequired));
}

#[tokio::test]
async fn test_premium_is_checked_at_use() {
    let (session, admin, content) = setup();
    seed(&content, Category::One, 1);

    let shown = expect_video(session.handle_at(1, Action::GetVideo, t0()).await.unwrap());
    admin.grant_premium(Operator::local(), 1, 1, t0()).unwrap();

    let view = expect_video(session.handle_at(1, Action::GetVideo, t0()).await.unwrap());
    assert!(view.download_allowed);
    // Single video: nothing to step to
    assert!(!view.nav.next);
    assert_eq!(
        session.handle_at(1, Action::Download, t0()).await.unwrap(),
        Response::Download(DownloadView {
            video: shown.video.clone(),
            protect_content: false,
        })
    );

    // A day later the same request is back on the free path
    let later = t0() + Duration::days(1);
    assert_eq!(
        session.handle_at(1, Action::Download, later).await.unwrap(),
        Response::Error(ErrorKind::PremiumRequired)
    );
    let view = expect_video(session.handle_at(1, Action::GetVideo, later).await.unwrap());
    assert!(!view.download_allowed);
}

#[tokio::test]
async fn test_bookmark_flow() {
    let (session, _, content) = setup();
    seed(&content, Category::Two, 6);

    // Nothing shown yet
    assert_eq!(
        session.handle_at(1, Action::Bookmark, t0()).await.unwrap(),
        Response::Error(ErrorKind::NotFound)
    );

    session
        .handle_at(1, Action::SwitchCategory(Selection::Category(Category::Two)), t0())
        .await
        .unwrap();
    assert_eq!(
        session.handle_at(1, Action::Bookmark, t0()).await.unwrap(),
        Response::Notice(Notice::BookmarkAdded { slots_left: 4 })
    );
    assert_eq!(
        session.handle_at(1, Action::Bookmark, t0()).await.unwrap(),
        Response::Notice(Notice::AlreadyBookmarked)
    );

    for _ in 0..4 {
        session.handle_at(1, Action::Next, t0()).await.unwrap();
        session.handle_at(1, Action::Bookmark, t0()).await.unwrap();
    }
    session.handle_at(1, Action::Next, t0()).await.unwrap();
    assert_eq!(
        session.handle_at(1, Action::Bookmark, t0()).await.unwrap(),
        Response::Error(ErrorKind::LimitExceeded { limit: 5 })
    );

    match session.handle_at(1, Action::ListBookmarks, t0()).await.unwrap() {
        Response::Bookmarks(view) => {
            assert_eq!(view.live.len(), 5);
            assert_eq!(view.limit, 5);
        }
        other => panic!("expected bookmarks, got {:?}", other),
    }

    // Ten minutes later all five are gone and reported once
    let later = t0() + Duration::minutes(10);
    match session.handle_at(1, Action::ListBookmarks, later).await.unwrap() {
        Response::Bookmarks(view) => {
            assert!(view.live.is_empty());
            assert_eq!(view.evicted.len(), 5);
        }
        other => panic!("expected bookmarks, got {:?}", other),
    }
}

#[tokio::test]
async fn test_votes_update_approval() {
    let (session, _, content) = setup();
    seed(&content, Category::One, 1);

    session.handle_at(1, Action::GetVideo, t0()).await.unwrap();
    session.handle_at(2, Action::GetVideo, t0()).await.unwrap();

    assert_eq!(
        session.handle_at(1, Action::Like, t0()).await.unwrap(),
        Response::Notice(Notice::VoteRecorded {
            liked: true,
            approval_percent: 100
        })
    );
    assert_eq!(
        session.handle_at(2, Action::Dislike, t0()).await.unwrap(),
        Response::Notice(Notice::VoteRecorded {
            liked: false,
            approval_percent: 50
        })
    );
    // Changing a vote replaces it
    session.handle_at(2, Action::Like, t0()).await.unwrap();

    let view = expect_video(session.handle_at(3, Action::GetVideo, t0()).await.unwrap());
    assert!(view.caption.ends_with("100% users liked this"));

    // Voting before anything was shown
    assert_eq!(
        session.handle_at(4, Action::Like, t0()).await.unwrap(),
        Response::Error(ErrorKind::NotFound)
    );
}

#[tokio::test]
async fn test_forward_protection_reaches_views() {
    let (session, admin, content) = setup();
    seed(&content, Category::One, 1);

    let view = expect_video(session.handle_at(1, Action::GetVideo, t0()).await.unwrap());
    assert!(!view.protect_content);

    admin.toggle_forward_protection(Operator::local(), t0()).unwrap();
    let view = expect_video(session.handle_at(1, Action::GetVideo, t0()).await.unwrap());
    assert!(view.protect_content);

    // Downloads follow the same setting
    admin.grant_premium(Operator::local(), 1, 1, t0()).unwrap();
    match session.handle_at(1, Action::Download, t0()).await.unwrap() {
        Response::Download(download) => {
            assert_eq!(download.video.id, view.video.id);
            assert!(download.protect_content);
        }
        other => panic!("expected a download, got {:?}", other),
    }
}

#[tokio::test]
async fn test_showing_a_video_is_not_a_watch() {
    let (session, _, content) = setup();
    seed(&content, Category::Two, 2);

    let watch_count = |response: Response| match response {
        Response::Status(status) => status.watch_count,
        other => panic!("expected status, got {:?}", other),
    };

    // Get Video shows the start of the category without counting
    let first = expect_video(session.handle_at(1, Action::GetVideo, t0()).await.unwrap());
    assert_eq!(first.video.source.message_seq, 1);
    assert_eq!(watch_count(session.handle_at(1, Action::Status, t0()).await.unwrap()), 0);

    let shown = expect_video(
        session
            .handle_at(1, Action::SwitchCategory(Selection::Category(Category::Two)), t0())
            .await
            .unwrap(),
    );
    let mut seqs = vec![shown.video.source.message_seq];
    for _ in 0..3 {
        let view = expect_video(session.handle_at(1, Action::Next, t0()).await.unwrap());
        seqs.push(view.video.source.message_seq);
    }

    assert_eq!(seqs, vec![1, 2, 1, 2]);
    assert_eq!(watch_count(session.handle_at(1, Action::Status, t0()).await.unwrap()), 3);
}

#[tokio::test]
async fn test_storage_waits_leave_the_runtime_free() {
    let (session, _, content) = setup();
    seed(&content, Category::One, 1);

    // Another holder keeps the connection busy for a while
    let db = content.database().clone();
    let (held_tx, held_rx) = std::sync::mpsc::channel();
    let holder = std::thread::spawn(move || {
        db.with_conn(|_| {
            held_tx.send(()).unwrap();
            std::thread::sleep(StdDuration::from_millis(400));
            Ok::<_, StoreError>(())
        })
        .unwrap();
    });
    held_rx.recv().unwrap();

    let request = {
        let session = session.clone();
        tokio::spawn(async move { session.handle_at(1, Action::GetVideo, t0()).await })
    };

    // Timers on this single-threaded runtime keep firing meanwhile
    let started = Instant::now();
    tokio::time::sleep(StdDuration::from_millis(20)).await;
    assert!(started.elapsed() < StdDuration::from_millis(200));

    assert!(matches!(request.await.unwrap().unwrap(), Response::Video(_)));
    holder.join().unwrap();
}

#[tokio::test]
async fn test_status_view() {
    let (session, admin, content) = setup();
    seed(&content, Category::One, 3);

    session.handle_at(1, Action::Next, t0()).await.unwrap();
    session.handle_at(1, Action::Next, t0()).await.unwrap();
    session.handle_at(1, Action::Bookmark, t0()).await.unwrap();
    admin.grant_premium(Operator::local(), 1, 7, t0()).unwrap();

    let response = session.handle_at(1, Action::Status, t0()).await.unwrap();
    assert_eq!(
        response,
        Response::Status(StatusView {
            user_id: 1,
            selection: Selection::Category(Category::One),
            watch_count: 2,
            entitlement: EntitlementStatus::Active {
                expires_at: t0() + Duration::days(7)
            },
            live_bookmarks: 1,
        })
    );
}

#[tokio::test]
async fn test_category_picker_and_mix() {
    let content = ContentStore::new(Database::open_in_memory().unwrap());
    let session = SessionOrchestrator::new(content.clone(), Arc::new(RoundRobin::default()));
    seed(&content, Category::Three, 1);

    assert_eq!(
        session.handle_at(1, Action::ChooseCategory, t0()).await.unwrap(),
        Response::Menu(Menu::Categories {
            current: Selection::Category(Category::One)
        })
    );

    let view = expect_video(
        session
            .handle_at(1, Action::SwitchCategory(Selection::Mix), t0())
            .await
            .unwrap(),
    );
    assert_eq!(view.selection, Selection::Mix);
    assert_eq!(view.video.category, Category::Three);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_user_actions_are_serialized() {
    let (session, _, content) = setup();
    seed(&content, Category::One, 4);
    session.handle_at(1, Action::Start, t0()).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..40 {
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            session.handle_at(1, Action::Next, t0()).await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    match session.handle_at(1, Action::Status, t0()).await.unwrap() {
        // No lost updates: every Next counted exactly once
        Response::Status(status) => assert_eq!(status.watch_count, 40),
        other => panic!("expected status, got {:?}", other),
    }
}
