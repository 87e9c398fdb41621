//! Bot Integration Tests
//!
//! Update routing against an in-memory transport: user commands, buttons,
//! admin authorization, channel posts and broadcast fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reelbot::adapters::telegram::Update;
use reelbot::adapters::{MessageRef, Outbound, Payload, Transport};
use reelbot::bot::{broadcast, Bot};
use reelbot::config::{self, ResolvedConfig};
use reelbot::core::{AdminService, SessionOrchestrator, UniformRandom};
use reelbot::domain::{Category, ContentPosted, NewVideo, SourceRef};
use reelbot::library::ContentStore;
use reelbot::store::Database;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;

const ADMIN: i64 = 100;
const LOG_CHANNEL: i64 = -777;

/// Records everything instead of talking to Telegram
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Outbound>>,
    acks: Mutex<Vec<(String, Option<String>)>>,
    /// Chats that reject messages
    unreachable: Vec<i64>,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap().clone()
    }

    fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .filter_map(|m| match m.payload {
                Payload::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &Outbound) -> Result<MessageRef> {
        if self.unreachable.contains(&message.chat_id) {
            anyhow::bail!("Forbidden: bot was blocked by the user");
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(MessageRef {
            chat_id: message.chat_id,
            message_id: sent.len() as i64,
        })
    }

    async fn delete(&self, _message: MessageRef) -> Result<()> {
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.acks
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

struct Harness {
    bot: Bot,
    transport: Arc<RecordingTransport>,
    content: ContentStore,
    ingest_rx: mpsc::Receiver<ContentPosted>,
    _home: TempDir,
}

fn test_config(home: &TempDir) -> ResolvedConfig {
    let env: HashMap<&str, String> = [
        ("REELBOT_HOME", home.path().display().to_string()),
        ("ADMIN_IDS", ADMIN.to_string()),
        ("LOG_CHANNEL_ID", LOG_CHANNEL.to_string()),
        ("AUTO_DELETE_VIDEOS", "false".to_string()),
    ]
    .into_iter()
    .collect();
    config::load_with(&|key| env.get(key).cloned(), home.path()).unwrap()
}

fn harness() -> Harness {
    let home = TempDir::new().unwrap();
    let cfg = test_config(&home);

    let content = ContentStore::new(Database::open_in_memory().unwrap());
    let transport = Arc::new(RecordingTransport::default());
    let (ingest_tx, ingest_rx) = mpsc::channel(8);

    let bot = Bot::new(
        transport.clone(),
        SessionOrchestrator::new(content.clone(), Arc::new(UniformRandom)),
        AdminService::new(content.clone()),
        &cfg,
        ingest_tx,
    );

    Harness {
        bot,
        transport,
        content,
        ingest_rx,
        _home: home,
    }
}

fn text_update(user_id: i64, text: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "chat": {"id": user_id},
            "from": {"id": user_id, "first_name": "Sam"},
            "text": text
        }
    }))
    .unwrap()
}

fn button_update(user_id: i64, data: &str) -> Update {
    serde_json::from_value(json!({
        "update_id": 2,
        "callback_query": {
            "id": "cb-1",
            "from": {"id": user_id, "username": "sam"},
            "message": {"message_id": 11, "chat": {"id": user_id}},
            "data": data
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_start_announces_new_user_once() {
    let h = harness();

    h.bot.dispatch(text_update(1, "/start")).await;
    h.bot.dispatch(text_update(1, "/start")).await;

    let replies = h.transport.texts_to(1);
    assert_eq!(replies.len(), 2);
    assert!(replies[0].contains("Welcome"));

    let announcements = h.transport.texts_to(LOG_CHANNEL);
    assert_eq!(announcements.len(), 1);
    assert!(announcements[0].contains("Sam"));
}

#[tokio::test]
async fn test_get_video_button_sends_video() {
    let h = harness();
    h.content
        .insert_if_absent(
            &NewVideo {
                category: Category::One,
                source: SourceRef::new(-1, 1),
                file_id: "BAAC-one".to_string(),
                caption: None,
                file_name: None,
                file_size: 0,
            },
            chrono::Utc::now(),
        )
        .unwrap();

    h.bot.dispatch(button_update(1, "get_video")).await;

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0].payload {
        Payload::Video { file_id, caption } => {
            assert_eq!(file_id, "BAAC-one");
            assert!(caption.starts_with("Video ID: "));
        }
        other => panic!("expected video, got {:?}", other),
    }
    let acks = h.transport.acks.lock().unwrap().clone();
    assert_eq!(acks, vec![("cb-1".to_string(), None)]);
}

#[tokio::test]
async fn test_premium_button_answers_with_toast() {
    let h = harness();
    h.bot.dispatch(button_update(1, "premium_required")).await;

    let acks = h.transport.acks.lock().unwrap().clone();
    assert_eq!(acks.len(), 1);
    assert!(acks[0].1.as_deref().unwrap_or_default().contains("premium"));
    // The toast is the whole answer
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn test_notice_buttons_send_one_answer() {
    let h = harness();
    h.content
        .insert_if_absent(
            &NewVideo {
                category: Category::One,
                source: SourceRef::new(-1, 1),
                file_id: "BAAC-one".to_string(),
                caption: None,
                file_name: None,
                file_size: 0,
            },
            chrono::Utc::now(),
        )
        .unwrap();

    h.bot.dispatch(button_update(1, "get_video")).await;
    h.bot.dispatch(button_update(1, "bookmark_video")).await;
    h.bot.dispatch(button_update(1, "like_video")).await;

    // Only the video itself became a chat message
    assert_eq!(h.transport.sent().len(), 1);
    assert!(h.transport.texts_to(1).is_empty());

    let acks = h.transport.acks.lock().unwrap().clone();
    assert_eq!(acks.len(), 3);
    assert!(acks[1].1.as_deref().unwrap_or_default().contains("Bookmarked"));
    assert!(acks[2].1.as_deref().unwrap_or_default().contains("users liked this"));
}

#[tokio::test]
async fn test_admin_commands_require_authorization() {
    let h = harness();
    h.bot.dispatch(text_update(1, "/start")).await;

    h.bot.dispatch(text_update(1, "/setpremium 1 30")).await;
    let replies = h.transport.texts_to(1);
    assert!(replies.last().unwrap().contains("not an administrator"));

    // Refused before any usage hint
    h.bot.dispatch(text_update(1, "/setpremium")).await;
    let replies = h.transport.texts_to(1);
    assert!(replies.last().unwrap().contains("not an administrator"));

    h.bot.dispatch(text_update(ADMIN, "/setpremium")).await;
    let replies = h.transport.texts_to(ADMIN);
    assert!(replies.last().unwrap().starts_with("Usage: /setpremium"));

    h.bot.dispatch(text_update(ADMIN, "/setpremium 1 30")).await;
    let replies = h.transport.texts_to(ADMIN);
    assert!(replies.last().unwrap().contains("Premium granted to 1"));

    h.bot.dispatch(text_update(ADMIN, "/setpremium 999 30")).await;
    let replies = h.transport.texts_to(ADMIN);
    assert!(replies.last().unwrap().contains("User not found"));

    h.bot.dispatch(text_update(ADMIN, "/toggleforward")).await;
    let replies = h.transport.texts_to(ADMIN);
    assert!(replies.last().unwrap().ends_with("on"));
}

#[tokio::test]
async fn test_channel_post_goes_to_ingestion() {
    let mut h = harness();
    let update: Update = serde_json::from_value(json!({
        "update_id": 3,
        "channel_post": {
            "message_id": 42,
            "chat": {"id": -1003},
            "caption": "fresh",
            "video": {"file_id": "BAAC-new", "file_name": "new.mp4", "file_size": 10}
        }
    }))
    .unwrap();

    h.bot.dispatch(update).await;

    let event = h.ingest_rx.try_recv().unwrap();
    assert_eq!(event.source(), SourceRef::new(-1003, 42));
    assert_eq!(event.caption.as_deref(), Some("fresh"));
    assert_eq!(event.file_size, 10);

    // Text posts carry no video and are ignored
    let text_post: Update = serde_json::from_value(json!({
        "update_id": 4,
        "channel_post": {"message_id": 43, "chat": {"id": -1003}, "text": "hello"}
    }))
    .unwrap();
    h.bot.dispatch(text_post).await;
    assert!(h.ingest_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_broadcast_counts_failures() {
    let transport = RecordingTransport {
        unreachable: vec![2],
        ..Default::default()
    };

    let report = broadcast(&transport, &[1, 2, 3], "Hello all", Duration::ZERO).await;
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(transport.texts_to(3), vec!["Hello all".to_string()]);
}
