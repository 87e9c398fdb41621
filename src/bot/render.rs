//! Responses → chat messages.

use chrono::{DateTime, Utc};

use crate::adapters::{Button, InlineKeyboard, Outbound, Payload};
use crate::core::session::{BookmarkView, StatusView};
use crate::core::{Action, BotSettings, ErrorKind, Menu, Notice, Response, Stats, VideoView};
use crate::domain::{Category, EntitlementStatus, PremiumWindow, Selection, UserId, VideoRecord};

use super::commands::callback_data;

fn button(text: &str, action: Action) -> Button {
    Button::new(text, callback_data(action))
}

fn main_menu_keyboard() -> InlineKeyboard {
    InlineKeyboard::new()
        .row(vec![button("🎬 Get Video", Action::GetVideo)])
        .row(vec![button("📂 Change Category", Action::ChooseCategory)])
        .row(vec![
            button("🔖 My Bookmarks", Action::ListBookmarks),
            button("👤 Status", Action::Status),
        ])
}

fn back_keyboard() -> InlineKeyboard {
    InlineKeyboard::new().row(vec![
        button("📂 Change Category", Action::ChooseCategory),
        button("🏠 Main Menu", Action::MainMenu),
    ])
}

fn video_keyboard(view: &VideoView) -> InlineKeyboard {
    let mut nav = Vec::new();
    if view.nav.previous {
        nav.push(button("⬅️ Previous", Action::Previous));
    }
    if view.nav.next {
        nav.push(button("Next ➡️", Action::Next));
    }

    let mut actions = Vec::new();
    if view.nav.bookmark {
        actions.push(button("🔖 Bookmark", Action::Bookmark));
    }
    actions.push(button("👍", Action::Like));
    actions.push(button("👎", Action::Dislike));

    let download = if view.download_allowed {
        button("⬇️ Download", Action::Download)
    } else {
        Button::new("🔒 Download (Premium)", "premium_required")
    };

    let mut footer = Vec::new();
    if view.nav.switch_category {
        footer.push(button("📂 Change Category", Action::ChooseCategory));
    }
    footer.push(button("🏠 Main Menu", Action::MainMenu));

    InlineKeyboard::new()
        .row(nav)
        .row(actions)
        .row(vec![download])
        .row(footer)
}

fn categories_keyboard(current: Selection) -> InlineKeyboard {
    let mark = |selection: Selection, label: String| {
        if selection == current {
            format!("✅ {}", label)
        } else {
            label
        }
    };

    let categories: Vec<Button> = Category::ALL
        .into_iter()
        .map(|c| {
            let selection = Selection::Category(c);
            Button::new(
                mark(selection, format!("Category {}", c)),
                callback_data(Action::SwitchCategory(selection)),
            )
        })
        .collect();

    let (first, second) = categories.split_at(2);
    InlineKeyboard::new()
        .row(first.to_vec())
        .row(second.to_vec())
        .row(vec![Button::new(
            mark(Selection::Mix, "🔀 Mix".to_string()),
            callback_data(Action::SwitchCategory(Selection::Mix)),
        )])
        .row(vec![button("🏠 Main Menu", Action::MainMenu)])
}

fn selection_label(selection: Selection) -> String {
    match selection {
        Selection::Category(c) => format!("Category {}", c),
        Selection::Mix => "Mix".to_string(),
    }
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn video_message(chat_id: i64, view: &VideoView) -> Outbound {
    Outbound {
        chat_id,
        payload: Payload::Video {
            file_id: view.video.file_id.clone(),
            caption: view.caption.clone(),
        },
        keyboard: Some(video_keyboard(view)),
        protect_content: view.protect_content,
    }
}

fn status_text(status: &StatusView) -> String {
    let premium = match status.entitlement {
        EntitlementStatus::Free => "Free".to_string(),
        EntitlementStatus::Active { expires_at } => format!("Premium until {}", format_date(expires_at)),
        EntitlementStatus::Expired { expired_at } => format!("Free (premium expired {})", format_date(expired_at)),
    };

    format!(
        "👤 Your status\n\nUser ID: {}\nPlan: {}\nCategory: {}\nVideos watched: {}\nBookmarks: {}",
        status.user_id,
        premium,
        selection_label(status.selection),
        status.watch_count,
        status.live_bookmarks,
    )
}

fn bookmark_messages(chat_id: i64, view: &BookmarkView) -> Vec<Outbound> {
    let mut header = if view.live.is_empty() {
        "🔖 You have no bookmarks.".to_string()
    } else {
        format!("🔖 Your bookmarks ({}/{})", view.live.len(), view.limit)
    };
    if !view.evicted.is_empty() {
        header.push_str(&format!("\n{} bookmark(s) expired or were removed.", view.evicted.len()));
    }

    let mut messages = vec![Outbound::text(chat_id, header).with_keyboard(back_keyboard())];
    for live in &view.live {
        let minutes = live.remaining.num_minutes().max(0) + 1;
        messages.push(Outbound {
            chat_id,
            payload: Payload::Video {
                file_id: live.video.file_id.clone(),
                caption: format!(
                    "Video ID: {}\nExpires in {} min",
                    live.video.short_code(),
                    minutes
                ),
            },
            keyboard: None,
            protect_content: true,
        });
    }
    messages
}

fn notice_text(notice: Notice) -> String {
    match notice {
        Notice::BookmarkAdded { slots_left } => format!(
            "🔖 Bookmarked for 10 minutes. {} slot(s) left.",
            slots_left
        ),
        Notice::AlreadyBookmarked => "🔖 Already in your bookmarks.".to_string(),
        Notice::VoteRecorded { liked: true, approval_percent } => {
            format!("👍 Thanks! {}% users liked this", approval_percent)
        }
        Notice::VoteRecorded { liked: false, approval_percent } => {
            format!("👎 Noted. {}% users liked this", approval_percent)
        }
    }
}

fn error_text(kind: ErrorKind) -> String {
    match kind {
        ErrorKind::NotFound => "⚠️ That video is no longer available.".to_string(),
        ErrorKind::LimitExceeded { limit } => format!(
            "⚠️ You can only keep {} bookmarks at a time. Wait for one to expire and try again.",
            limit
        ),
        ErrorKind::PremiumRequired => {
            "🔒 Downloads are a premium feature. Contact an admin to upgrade.".to_string()
        }
    }
}

/// Short toast for a button press, when the response deserves one
pub fn toast(response: &Response) -> Option<String> {
    match response {
        Response::Notice(notice) => Some(notice_text(*notice)),
        Response::Error(kind) => Some(error_text(*kind)),
        _ => None,
    }
}

/// Messages to send for a session response
pub fn render(chat_id: i64, response: &Response) -> Vec<Outbound> {
    match response {
        Response::Video(view) => vec![video_message(chat_id, view)],

        Response::Menu(Menu::Main { first_contact, premium }) => {
            let greeting = if *first_contact { "👋 Welcome!" } else { "🏠 Main menu" };
            let plan = if *premium { "⭐ Premium" } else { "Free plan" };
            vec![Outbound::text(chat_id, format!("{}\n{}\n\nPick an option below.", greeting, plan))
                .with_keyboard(main_menu_keyboard())]
        }

        Response::Menu(Menu::Categories { current }) => vec![Outbound::text(
            chat_id,
            format!("📂 Choose a category (current: {})", selection_label(*current)),
        )
        .with_keyboard(categories_keyboard(*current))],

        Response::Empty(selection) => vec![Outbound::text(
            chat_id,
            format!("📭 No videos in {} yet. Try another category.", selection_label(*selection)),
        )
        .with_keyboard(back_keyboard())],

        Response::Status(status) => {
            vec![Outbound::text(chat_id, status_text(status)).with_keyboard(back_keyboard())]
        }

        Response::Bookmarks(view) => bookmark_messages(chat_id, view),

        Response::Notice(notice) => vec![Outbound::text(chat_id, notice_text(*notice))],

        Response::Download(download) => vec![Outbound {
            chat_id,
            payload: Payload::Document {
                file_id: download.video.file_id.clone(),
                caption: download.video.display_name(),
            },
            keyboard: None,
            protect_content: download.protect_content,
        }],

        Response::Error(kind) => vec![Outbound::text(chat_id, error_text(*kind))],
    }
}

pub fn stats_text(stats: &Stats) -> String {
    let mut text = format!(
        "📊 Stats\n\nUsers: {}\nPremium users: {}\nVideos: {}",
        stats.total_users,
        stats.premium_users,
        stats.total_videos()
    );
    for (category, count) in &stats.counts_by_category {
        text.push_str(&format!("\n  Category {}: {}", category, count));
    }
    text
}

pub fn settings_text(settings: &BotSettings) -> String {
    format!(
        "⚙️ Settings\n\nForward protection: {}",
        if settings.forward_protection { "on" } else { "off" }
    )
}

pub fn premium_granted_text(user_id: UserId, window: &PremiumWindow) -> String {
    format!(
        "✅ Premium granted to {} until {}",
        user_id,
        format_date(window.expires_at)
    )
}

pub fn new_user_announcement(user_id: UserId, name: &str) -> String {
    format!("👤 New user: {} ({})", name, user_id)
}

pub fn new_video_announcement(video: &VideoRecord) -> String {
    format!(
        "🎬 New video in Category {}: {} ({})",
        video.category,
        video.short_code(),
        video.display_name()
    )
}
