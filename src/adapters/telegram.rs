//! Telegram Bot API transport.
//!
//! Long-polls `getUpdates` for user messages, button presses and channel
//! posts, and delivers replies with `sendMessage`/`sendVideo`/`sendDocument`.
//! Videos are re-sent by `file_id`, so nothing is uploaded.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{MessageRef, Outbound, Payload, Transport};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    /// Bot token
    bot_token: String,
    /// API root, overridable for a local Bot API server
    api_base: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response envelope from Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// An incoming update
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub channel_post: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<TgUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub video: Option<Video>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl TgUser {
    /// `@username` when set, otherwise the first name
    pub fn display_name(&self) -> String {
        match (&self.username, &self.first_name) {
            (Some(username), _) => format!("@{}", username),
            (None, Some(name)) => name.clone(),
            (None, None) => self.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Message result from the send* methods
#[derive(Debug, Deserialize)]
struct MessageResult {
    message_id: i64,
}

/// Configuration for Telegram client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from config
    pub fn from_config(config: TelegramConfig) -> Self {
        let mut client = Self::new(config.bot_token);
        if let Some(base) = config.api_base {
            client.api_base = base.trim_end_matches('/').to_string();
        }
        client
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value, timeout: Option<Duration>) -> Result<T> {
        let mut request = self.client.post(self.api_url(method)).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to call Telegram {}", method))?;

        let result: TelegramResponse<T> = response
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error in {}: {}",
                method,
                result.description.unwrap_or_default()
            );
        }

        result
            .result
            .with_context(|| format!("Telegram {} returned no result", method))
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "channel_post", "callback_query"],
        });
        // Leave the HTTP request room beyond the server-side wait
        self.call("getUpdates", body, Some(Duration::from_secs(timeout_secs + 10)))
            .await
    }

    /// Send a text message
    pub async fn send_message(&self, chat_id: i64, text: &str, extra: Value) -> Result<i64> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        merge(&mut body, extra);
        let result: MessageResult = self.call("sendMessage", body, None).await?;
        Ok(result.message_id)
    }

    /// Re-send a stored video
    pub async fn send_video(&self, chat_id: i64, file_id: &str, caption: &str, extra: Value) -> Result<i64> {
        let mut body = json!({ "chat_id": chat_id, "video": file_id, "caption": caption });
        merge(&mut body, extra);
        let result: MessageResult = self.call("sendVideo", body, None).await?;
        Ok(result.message_id)
    }

    /// Re-send a stored video as a file
    pub async fn send_document(&self, chat_id: i64, file_id: &str, caption: &str, extra: Value) -> Result<i64> {
        let mut body = json!({ "chat_id": chat_id, "document": file_id, "caption": caption });
        merge(&mut body, extra);
        let result: MessageResult = self.call("sendDocument", body, None).await?;
        Ok(result.message_id)
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                json!({ "chat_id": chat_id, "message_id": message_id }),
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            merge(&mut body, json!({ "text": text }));
        }
        let _: bool = self.call("answerCallbackQuery", body, None).await?;
        Ok(())
    }
}

/// Shallow-merge the fields of `extra` into `body`
fn merge(body: &mut Value, extra: Value) {
    if let (Value::Object(body), Value::Object(extra)) = (body, extra) {
        body.extend(extra);
    }
}

/// Keyboard and protection fields shared by all send* calls
fn send_options(message: &Outbound) -> Result<Value> {
    let mut extra = json!({});
    if let Some(keyboard) = &message.keyboard {
        merge(&mut extra, json!({ "reply_markup": serde_json::to_value(keyboard)? }));
    }
    if message.protect_content {
        merge(&mut extra, json!({ "protect_content": true }));
    }
    Ok(extra)
}

#[async_trait]
impl Transport for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &Outbound) -> Result<MessageRef> {
        let extra = send_options(message)?;
        let message_id = match &message.payload {
            Payload::Text(text) => self.send_message(message.chat_id, text, extra).await?,
            Payload::Video { file_id, caption } => {
                self.send_video(message.chat_id, file_id, caption, extra).await?
            }
            Payload::Document { file_id, caption } => {
                self.send_document(message.chat_id, file_id, caption, extra).await?
            }
        };
        debug!(chat_id = message.chat_id, message_id, "Delivered");

        Ok(MessageRef {
            chat_id: message.chat_id,
            message_id,
        })
    }

    async fn delete(&self, message: MessageRef) -> Result<()> {
        self.delete_message(message.chat_id, message.message_id).await
    }

    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answer_callback_query(callback_id, text).await
    }
}
