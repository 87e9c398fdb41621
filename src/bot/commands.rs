//! Slash commands and button payloads.

use thiserror::Error;

use crate::core::Action;
use crate::domain::{Category, Selection, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: /{0}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// Commands only admins may run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    SetPremium { user_id: UserId, days: i64 },
    RemovePremium { user_id: UserId },
    Stats,
    Broadcast(String),
    ToggleForward,
    Settings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(Action),
    Admin(AdminCommand),
}

const SET_PREMIUM_USAGE: &str = "/setpremium <user_id> <days>";
const REMOVE_PREMIUM_USAGE: &str = "/removepremium <user_id>";
const BROADCAST_USAGE: &str = "/broadcast <message>";

const ADMIN_COMMANDS: [&str; 6] = [
    "setpremium",
    "removepremium",
    "stats",
    "broadcast",
    "toggleforward",
    "settings",
];

/// Lowercased command name and trimmed arguments, if `text` is a command
fn split_command(text: &str) -> Option<(String, &str)> {
    let rest = text.trim().strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    // "/start@reel_bot" in group chats
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    Some((name, args))
}

/// True for admin-only commands, whether or not their arguments parse
pub fn requires_admin(text: &str) -> bool {
    split_command(text).is_some_and(|(name, _)| ADMIN_COMMANDS.contains(&name.as_str()))
}

/// Parse a chat message. Plain text (no leading `/`) is `Ok(None)`.
pub fn parse_command(text: &str) -> Result<Option<Command>, CommandError> {
    let Some((name, args)) = split_command(text) else {
        return Ok(None);
    };

    let command = match name.as_str() {
        "start" => Command::User(Action::Start),
        "mybookmarks" => Command::User(Action::ListBookmarks),
        "status" => Command::User(Action::Status),
        "setpremium" => {
            let mut parts = args.split_whitespace();
            let user_id = parts.next().and_then(|p| p.parse().ok());
            let days = parts.next().and_then(|p| p.parse().ok());
            match (user_id, days, parts.next()) {
                (Some(user_id), Some(days), None) => Command::Admin(AdminCommand::SetPremium { user_id, days }),
                _ => return Err(CommandError::Usage(SET_PREMIUM_USAGE)),
            }
        }
        "removepremium" => match args.parse() {
            Ok(user_id) => Command::Admin(AdminCommand::RemovePremium { user_id }),
            Err(_) => return Err(CommandError::Usage(REMOVE_PREMIUM_USAGE)),
        },
        "stats" => Command::Admin(AdminCommand::Stats),
        "broadcast" if !args.is_empty() => Command::Admin(AdminCommand::Broadcast(args.to_string())),
        "broadcast" => return Err(CommandError::Usage(BROADCAST_USAGE)),
        "toggleforward" => Command::Admin(AdminCommand::ToggleForward),
        "settings" => Command::Admin(AdminCommand::Settings),
        _ => return Err(CommandError::Unknown(name)),
    };

    Ok(Some(command))
}

/// Map button payload to an action
pub fn parse_callback(data: &str) -> Option<Action> {
    let action = match data {
        "get_video" => Action::GetVideo,
        "next_video" => Action::Next,
        "prev_video" => Action::Previous,
        "cat_mix" => Action::SwitchCategory(Selection::Mix),
        "bookmark_video" => Action::Bookmark,
        "my_bookmarks" => Action::ListBookmarks,
        "like_video" => Action::Like,
        "dislike_video" => Action::Dislike,
        // Non-premium users get this button; the session answers with the gate
        "download_video" | "premium_required" => Action::Download,
        "change_category" => Action::ChooseCategory,
        "status" => Action::Status,
        "main_menu" => Action::MainMenu,
        other => {
            let n = other.strip_prefix("cat_")?.parse::<i64>().ok()?;
            Action::SwitchCategory(Selection::Category(Category::from_number(n)?))
        }
    };
    Some(action)
}

/// Button payload for an action
pub fn callback_data(action: Action) -> String {
    match action {
        Action::GetVideo => "get_video".to_string(),
        Action::Next => "next_video".to_string(),
        Action::Previous => "prev_video".to_string(),
        Action::SwitchCategory(Selection::Mix) => "cat_mix".to_string(),
        Action::SwitchCategory(Selection::Category(c)) => format!("cat_{}", c.number()),
        Action::Bookmark => "bookmark_video".to_string(),
        Action::ListBookmarks => "my_bookmarks".to_string(),
        Action::Like => "like_video".to_string(),
        Action::Dislike => "dislike_video".to_string(),
        Action::Download => "download_video".to_string(),
        Action::ChooseCategory => "change_category".to_string(),
        Action::Status => "status".to_string(),
        Action::Start | Action::MainMenu => "main_menu".to_string(),
    }
}
