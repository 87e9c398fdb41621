//! Transport interfaces for chat platforms.
//!
//! The bot loop renders responses into [`Outbound`] messages and hands them
//! to a [`Transport`]. Telegram is the only production transport.

pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

// Re-export the Telegram transport
pub use telegram::TelegramClient;

/// One inline button
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Buttons attached under a message, row by row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    #[serde(rename = "inline_keyboard")]
    pub rows: Vec<Vec<Button>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
        self
    }

    /// All callback payloads, in display order
    pub fn callbacks(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.callback_data.as_str())
    }
}

/// Message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    /// Re-send a stored video by its media reference
    Video { file_id: String, caption: String },
    /// Same media as a downloadable file
    Document { file_id: String, caption: String },
}

/// A message to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub chat_id: i64,
    pub payload: Payload,
    pub keyboard: Option<InlineKeyboard>,
    /// Forbid forwarding and saving
    pub protect_content: bool,
}

impl Outbound {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            payload: Payload::Text(text.into()),
            keyboard: None,
            protect_content: false,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn is_video(&self) -> bool {
        matches!(self.payload, Payload::Video { .. })
    }
}

/// A delivered message, addressable for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Trait for outbound chat transports
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name
    fn name(&self) -> &str;

    /// Deliver a message
    async fn send(&self, message: &Outbound) -> Result<MessageRef>;

    /// Delete a previously delivered message
    async fn delete(&self, message: MessageRef) -> Result<()>;

    /// Answer a button press, optionally with a short toast
    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
