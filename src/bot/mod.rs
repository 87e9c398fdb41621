//! The running bot: updates in, messages out.
//!
//! Channel posts feed the ingestion pipeline; user messages and button
//! presses go through the session orchestrator; admin commands go through
//! the admin service after authorization. Sent videos are deleted again
//! after the configured delay, and a background task sweeps expired
//! bookmarks and premium windows.

pub mod commands;
pub mod render;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::telegram::{CallbackQuery, Message, TgUser, Update};
use crate::adapters::{MessageRef, Outbound, TelegramClient, Transport};
use crate::config::ResolvedConfig;
use crate::core::{Action, AdminService, AdminSet, Menu, Response, SessionOrchestrator};
use crate::domain::{ContentPosted, UserId, VideoRecord};
use crate::ingest::IngestionPipeline;
use crate::library::ContentStore;

use commands::{parse_callback, parse_command, requires_admin, AdminCommand, Command};

/// Pause between broadcast messages to stay under Telegram rate limits
const BROADCAST_DELAY: Duration = Duration::from_millis(100);

/// Back-off after a failed poll
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Outcome of a broadcast fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct Bot {
    transport: Arc<dyn Transport>,
    session: SessionOrchestrator,
    admin: AdminService,
    admins: AdminSet,
    /// Channel posts are queued here for the ingestion pipeline
    ingest_tx: mpsc::Sender<ContentPosted>,
    log_channel: Option<i64>,
    auto_delete: Option<Duration>,
}

impl Bot {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: SessionOrchestrator,
        admin: AdminService,
        config: &ResolvedConfig,
        ingest_tx: mpsc::Sender<ContentPosted>,
    ) -> Self {
        Self {
            transport,
            session,
            admin,
            admins: config.admins.clone(),
            ingest_tx,
            log_channel: config.log_channel,
            auto_delete: config.auto_delete.delay(),
        }
    }

    /// Route one update. Failures are logged, never propagated.
    pub async fn dispatch(&self, update: Update) {
        if let Some(post) = update.channel_post {
            self.on_channel_post(post).await;
        } else if let Some(query) = update.callback_query {
            self.on_callback(query).await;
        } else if let Some(message) = update.message {
            self.on_message(message).await;
        }
    }

    async fn on_channel_post(&self, post: Message) {
        let Some(video) = post.video else {
            return;
        };

        let mut event = ContentPosted::new(post.chat.id, post.message_id, video.file_id);
        event.caption = post.caption;
        event.file_name = video.file_name;
        event.file_size = video.file_size.unwrap_or(0);

        if self.ingest_tx.send(event).await.is_err() {
            error!(channel_id = post.chat.id, "Ingestion pipeline is gone, dropping post");
        }
    }

    #[instrument(skip(self, query), fields(user_id = query.from.id))]
    async fn on_callback(&self, query: CallbackQuery) {
        let user_id = query.from.id;
        let chat_id = query.message.as_ref().map_or(user_id, |m| m.chat.id);

        let Some(action) = query.data.as_deref().and_then(parse_callback) else {
            debug!(data = ?query.data, "Unknown callback");
            self.acknowledge(&query.id, None).await;
            return;
        };

        match self.session.handle(user_id, action).await {
            // Notices and errors answer the button press and nothing else
            Ok(response) => match render::toast(&response) {
                Some(toast) => self.acknowledge(&query.id, Some(&toast)).await,
                None => {
                    self.acknowledge(&query.id, None).await;
                    self.deliver(chat_id, &response).await;
                }
            },
            Err(e) => {
                error!("Failed to handle {:?}: {}", action, e);
                self.acknowledge(&query.id, Some("Something went wrong, try again."))
                    .await;
            }
        }
    }

    #[instrument(skip(self, message), fields(chat_id = message.chat.id))]
    async fn on_message(&self, message: Message) {
        let Some(from) = message.from.clone() else {
            return;
        };
        let chat_id = message.chat.id;
        let text = message.text.unwrap_or_default();

        if requires_admin(&text) {
            if let Err(e) = self.admins.authorize(from.id) {
                self.send(Outbound::text(chat_id, format!("⛔ {}", e))).await;
                return;
            }
        }

        let command = match parse_command(&text) {
            Ok(Some(command)) => command,
            // Plain text gets the main menu
            Ok(None) => Command::User(Action::MainMenu),
            Err(e) => {
                self.send(Outbound::text(chat_id, e.to_string())).await;
                return;
            }
        };

        match command {
            Command::User(action) => self.on_user_action(&from, chat_id, action).await,
            Command::Admin(command) => self.on_admin_command(from.id, chat_id, command).await,
        }
    }

    async fn on_user_action(&self, from: &TgUser, chat_id: i64, action: Action) {
        match self.session.handle(from.id, action).await {
            Ok(response) => {
                if let Response::Menu(Menu::Main {
                    first_contact: true,
                    ..
                }) = response
                {
                    info!(user_id = from.id, "New user");
                    self.announce(render::new_user_announcement(from.id, &from.display_name()))
                        .await;
                }
                self.deliver(chat_id, &response).await;
            }
            Err(e) => {
                error!(user_id = from.id, "Failed to handle {:?}: {}", action, e);
                self.send(Outbound::text(chat_id, "Something went wrong, try again."))
                    .await;
            }
        }
    }

    async fn on_admin_command(&self, caller: UserId, chat_id: i64, command: AdminCommand) {
        let op = match self.admins.authorize(caller) {
            Ok(op) => op,
            Err(e) => {
                self.send(Outbound::text(chat_id, format!("⛔ {}", e))).await;
                return;
            }
        };
        let now = Utc::now();

        let reply = match command {
            AdminCommand::SetPremium { user_id, days } => self
                .admin
                .grant_premium(op, user_id, days, now)
                .map(|window| render::premium_granted_text(user_id, &window)),
            AdminCommand::RemovePremium { user_id } => self
                .admin
                .revoke_premium(op, user_id)
                .map(|()| format!("✅ Premium removed from {}", user_id)),
            AdminCommand::Stats => self.admin.stats(op, now).map(|s| render::stats_text(&s)),
            AdminCommand::Settings => self.admin.settings(op).map(|s| render::settings_text(&s)),
            AdminCommand::ToggleForward => self
                .admin
                .toggle_forward_protection(op, now)
                .map(|on| format!("Forward protection is now {}", if on { "on" } else { "off" })),
            AdminCommand::Broadcast(text) => match self.admin.broadcast_targets(op) {
                Ok(targets) => {
                    let count = targets.len();
                    self.spawn_broadcast(chat_id, targets, text);
                    Ok(format!("📣 Broadcasting to {} users...", count))
                }
                Err(e) => Err(e),
            },
        };

        let text = reply.unwrap_or_else(|e| format!("⚠️ {}", e));
        self.send(Outbound::text(chat_id, text)).await;
    }

    /// Render and send a response
    async fn deliver(&self, chat_id: i64, response: &Response) {
        for message in render::render(chat_id, response) {
            self.send(message).await;
        }
    }

    async fn send(&self, message: Outbound) -> Option<MessageRef> {
        match self.transport.send(&message).await {
            Ok(sent) => {
                if message.is_video() {
                    self.schedule_delete(sent);
                }
                Some(sent)
            }
            Err(e) => {
                warn!(chat_id = message.chat_id, transport = self.transport.name(), "Send failed: {}", e);
                None
            }
        }
    }

    fn schedule_delete(&self, sent: MessageRef) {
        let Some(delay) = self.auto_delete else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = transport.delete(sent).await {
                debug!(chat_id = sent.chat_id, message_id = sent.message_id, "Auto-delete failed: {}", e);
            }
        });
    }

    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) {
        if let Err(e) = self.transport.acknowledge(callback_id, text).await {
            debug!("Failed to answer callback: {}", e);
        }
    }

    /// Post to the log channel, if one is configured
    pub async fn announce(&self, text: String) {
        if let Some(channel) = self.log_channel {
            if let Err(e) = self.transport.send(&Outbound::text(channel, text)).await {
                warn!(channel, "Log channel post failed: {}", e);
            }
        }
    }

    pub async fn announce_video(&self, video: &VideoRecord) {
        self.announce(render::new_video_announcement(video)).await;
    }

    /// Fan a message out to `targets`, outside any per-user lock
    fn spawn_broadcast(&self, admin_chat: i64, targets: Vec<UserId>, text: String) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let report = broadcast(transport.as_ref(), &targets, &text, BROADCAST_DELAY).await;
            let summary = format!("📣 Broadcast finished: {} sent, {} failed", report.sent, report.failed);
            if let Err(e) = transport.send(&Outbound::text(admin_chat, summary)).await {
                warn!("Failed to report broadcast result: {}", e);
            }
        });
    }

    /// Long-poll until Ctrl-C. Each update runs as its own task.
    pub async fn run(self: Arc<Self>, client: TelegramClient, poll_timeout_secs: u64) -> Result<()> {
        let mut offset = 0;
        info!(transport = self.transport.name(), "Polling for updates");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    return Ok(());
                }
                result = client.get_updates(offset, poll_timeout_secs) => match result {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            let bot = Arc::clone(&self);
                            tokio::spawn(async move { bot.dispatch(update).await });
                        }
                    }
                    Err(e) => {
                        warn!("getUpdates failed: {:#}", e);
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                },
            }
        }
    }
}

/// Send `text` to every target, pausing `delay` between messages
pub async fn broadcast(transport: &dyn Transport, targets: &[UserId], text: &str, delay: Duration) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for (i, &user_id) in targets.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        match transport.send(&Outbound::text(user_id, text)).await {
            Ok(_) => report.sent += 1,
            Err(e) => {
                debug!(user_id, "Broadcast delivery failed: {}", e);
                report.failed += 1;
            }
        }
    }
    info!(sent = report.sent, failed = report.failed, "Broadcast complete");
    report
}

/// Periodically drop expired bookmarks, premium windows and idle user locks
pub fn spawn_sweeper(session: SessionOrchestrator, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let session = session.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || sweep_once(&session, Utc::now())).await {
                error!("Sweep task failed: {}", e);
            }
        }
    })
}

fn sweep_once(session: &SessionOrchestrator, now: DateTime<Utc>) {
    match session.bookmarks().sweep(now) {
        Ok(n) if n > 0 => info!(removed = n, "Expired bookmarks swept"),
        Ok(_) => {}
        Err(e) => warn!("Bookmark sweep failed: {}", e),
    }
    match session.entitlement().sweep(now) {
        Ok(n) if n > 0 => info!(cleared = n, "Expired premium windows cleared"),
        Ok(_) => {}
        Err(e) => warn!("Premium sweep failed: {}", e),
    }
    session.locks().prune();
}

/// Wire everything up and poll until shutdown
pub async fn serve(config: &ResolvedConfig, content: ContentStore) -> Result<()> {
    let token = config.require_token()?;
    config.channels.require_complete()?;

    let client = TelegramClient::new(token);
    let session = SessionOrchestrator::new(content.clone(), config.mix_strategy.build());
    let admin = AdminService::new(content.clone());
    let pipeline = IngestionPipeline::new(content, config.channels);

    let (ingest_tx, ingest_rx) = mpsc::channel(256);
    let (inserted_tx, mut inserted_rx) = mpsc::unbounded_channel();

    let bot = Arc::new(Bot::new(
        Arc::new(client.clone()),
        session.clone(),
        admin,
        config,
        ingest_tx,
    ));

    tokio::spawn(async move { pipeline.run_notifying(ingest_rx, inserted_tx).await });

    let announcer = Arc::clone(&bot);
    tokio::spawn(async move {
        while let Some(video) = inserted_rx.recv().await {
            announcer.announce_video(&video).await;
        }
    });

    let sweeper = spawn_sweeper(session, config.sweep_interval);
    info!(
        admins = config.admins.len(),
        auto_delete = ?config.auto_delete.delay(),
        mix = ?config.mix_strategy,
        "Bot started"
    );

    let result = bot.run(client, config.poll_timeout_secs).await;
    sweeper.abort();
    result
}
