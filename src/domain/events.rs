//! Inbound ingestion events.

use serde::{Deserialize, Serialize};

use super::video::SourceRef;

/// New content appeared in a monitored channel.
///
/// Delivered at least once; the same `(channel_id, message_seq)` may arrive
/// repeatedly and from concurrent producers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPosted {
    pub channel_id: i64,
    pub message_seq: i64,

    /// Transport media reference of the posted video
    pub file_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default)]
    pub file_size: u64,
}

impl ContentPosted {
    pub fn new(channel_id: i64, message_seq: i64, file_id: impl Into<String>) -> Self {
        Self {
            channel_id,
            message_seq,
            file_id: file_id.into(),
            caption: None,
            file_name: None,
            file_size: 0,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_file(mut self, file_name: impl Into<String>, file_size: u64) -> Self {
        self.file_name = Some(file_name.into());
        self.file_size = file_size;
        self
    }

    pub fn source(&self) -> SourceRef {
        SourceRef::new(self.channel_id, self.message_seq)
    }
}
