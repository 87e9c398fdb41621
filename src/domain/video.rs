//! Video records as stored in the library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::category::Category;

/// Row identifier of a stored video
pub type VideoId = i64;

/// Where a video came from: a message in a monitored channel.
///
/// Unique across the library; re-delivery of the same message must not
/// produce a second record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Telegram chat id of the channel
    pub channel_id: i64,

    /// Message id within the channel (monotonic per channel)
    pub message_seq: i64,
}

impl SourceRef {
    pub fn new(channel_id: i64, message_seq: i64) -> Self {
        Self {
            channel_id,
            message_seq,
        }
    }

    /// Short public code shown in captions (SHA256(channel:seq)[0:5])
    pub fn short_code(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", self.channel_id, self.message_seq).as_bytes());
        let result = hasher.finalize();

        let mut code = hex::encode(&result[..3]);
        code.truncate(5);
        code
    }
}

/// A video about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVideo {
    pub category: Category,
    pub source: SourceRef,

    /// Transport media reference used to re-send the video
    pub file_id: String,

    pub caption: Option<String>,
    pub file_name: Option<String>,
    pub file_size: u64,
}

/// A stored, immutable video record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: VideoId,
    pub category: Category,
    pub source: SourceRef,
    pub file_id: String,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    pub file_size: u64,
    pub ingested_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn short_code(&self) -> String {
        self.source.short_code()
    }

    /// Name for listings, falling back to the short code
    pub fn display_name(&self) -> String {
        match &self.file_name {
            Some(name) if !name.trim().is_empty() => name.replace('_', " "),
            _ => format!("Video {}", self.short_code()),
        }
    }
}
