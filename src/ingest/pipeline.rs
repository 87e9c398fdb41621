//! Content ingestion.
//!
//! Each `ContentPosted` event is resolved to a category through the static
//! channel map and written with insert-if-absent, so at-least-once and
//! concurrent duplicate delivery leave exactly one record. Unmapped channels
//! are reported and skipped; nothing here stops the stream.

use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::ChannelMap;
use crate::domain::{ContentPosted, NewVideo, SourceRef, VideoRecord};
use crate::library::ContentStore;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Channel {channel_id} is not mapped to a category (message {message_seq})")]
    UnmappedChannel { channel_id: i64, message_seq: i64 },

    #[error("Invalid event on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of ingesting one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted(VideoRecord),

    /// Already in the library; nothing changed
    Duplicate(SourceRef),
}

/// Running totals for a stream or file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub inserted: usize,
    pub duplicates: usize,
    pub unmapped: usize,
    pub failed: usize,
}

impl IngestStats {
    pub fn record(&mut self, result: &Result<IngestOutcome, IngestError>) {
        match result {
            Ok(IngestOutcome::Inserted(_)) => self.inserted += 1,
            Ok(IngestOutcome::Duplicate(_)) => self.duplicates += 1,
            Err(IngestError::UnmappedChannel { .. }) => self.unmapped += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.duplicates + self.unmapped + self.failed
    }
}

#[derive(Clone)]
pub struct IngestionPipeline {
    content: ContentStore,
    channels: ChannelMap,
}

impl IngestionPipeline {
    pub fn new(content: ContentStore, channels: ChannelMap) -> Self {
        Self { content, channels }
    }

    pub fn channels(&self) -> &ChannelMap {
        &self.channels
    }

    /// Ingest one event
    #[instrument(skip(self, event, now), fields(channel_id = event.channel_id, message_seq = event.message_seq))]
    pub fn ingest(&self, event: &ContentPosted, now: DateTime<Utc>) -> Result<IngestOutcome, IngestError> {
        let category = self
            .channels
            .category_of(event.channel_id)
            .ok_or(IngestError::UnmappedChannel {
                channel_id: event.channel_id,
                message_seq: event.message_seq,
            })?;

        let source = event.source();
        let video = NewVideo {
            category,
            source,
            file_id: event.file_id.clone(),
            caption: event.caption.clone(),
            file_name: event.file_name.clone(),
            file_size: event.file_size,
        };

        let inserted = self.content.insert_if_absent(&video, now)?;
        self.content
            .advance_cursor(event.channel_id, event.message_seq, now)?;

        if !inserted {
            return Ok(IngestOutcome::Duplicate(source));
        }
        match self.content.find_by_source(source)? {
            Some(record) => Ok(IngestOutcome::Inserted(record)),
            // Removed again before we could read it back
            None => Ok(IngestOutcome::Duplicate(source)),
        }
    }

    /// Drain `events` until every sender is dropped
    pub async fn run(&self, events: mpsc::Receiver<ContentPosted>) -> IngestStats {
        self.run_inner(events, None).await
    }

    /// Like `run`, also forwarding each newly inserted record
    pub async fn run_notifying(
        &self,
        events: mpsc::Receiver<ContentPosted>,
        inserted: mpsc::UnboundedSender<VideoRecord>,
    ) -> IngestStats {
        self.run_inner(events, Some(inserted)).await
    }

    async fn run_inner(
        &self,
        mut events: mpsc::Receiver<ContentPosted>,
        notify: Option<mpsc::UnboundedSender<VideoRecord>>,
    ) -> IngestStats {
        let mut stats = IngestStats::default();

        while let Some(event) = events.recv().await {
            let result = self.ingest(&event, Utc::now());
            log_result(&event, &result);
            stats.record(&result);

            if let (Some(tx), Ok(IngestOutcome::Inserted(record))) = (&notify, result) {
                // Receiver gone just means nobody is announcing
                let _ = tx.send(record);
            }
        }

        info!(
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            unmapped = stats.unmapped,
            failed = stats.failed,
            "Ingestion stream closed"
        );
        stats
    }

    /// Replay a JSONL file of `ContentPosted` events.
    ///
    /// Malformed lines are counted as failed and skipped.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestStats, IngestError> {
        let file = File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut stats = IngestStats::default();
        let mut line_no = 0;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let result = serde_json::from_str::<ContentPosted>(&line)
                .map_err(|source| IngestError::Parse {
                    line: line_no,
                    source,
                })
                .and_then(|event| {
                    let result = self.ingest(&event, Utc::now());
                    log_result(&event, &result);
                    result
                });

            if let Err(e @ IngestError::Parse { .. }) = &result {
                warn!(path = %path.display(), "{}", e);
            }
            stats.record(&result);
        }

        info!(
            path = %path.display(),
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            unmapped = stats.unmapped,
            failed = stats.failed,
            "Backfill complete"
        );
        Ok(stats)
    }
}

fn log_result(event: &ContentPosted, result: &Result<IngestOutcome, IngestError>) {
    match result {
        Ok(IngestOutcome::Inserted(record)) => {
            info!(video_id = record.id, category = %record.category, code = %record.short_code(), "Video ingested");
        }
        Ok(IngestOutcome::Duplicate(source)) => {
            debug!(channel_id = source.channel_id, message_seq = source.message_seq, "Duplicate delivery ignored");
        }
        Err(e @ IngestError::UnmappedChannel { .. }) => {
            warn!(channel_id = event.channel_id, "{}", e);
        }
        Err(e) => {
            warn!(channel_id = event.channel_id, message_seq = event.message_seq, "Ingestion failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use crate::store::Database;

    fn pipeline() -> IngestionPipeline {
        let content = ContentStore::new(Database::open_in_memory().unwrap());
        IngestionPipeline::new(content, ChannelMap::new(-1001, -1002, -1003, -1004))
    }

    #[test]
    fn test_duplicate_is_noop() {
        let pipeline = pipeline();
        let event = ContentPosted::new(-1002, 10, "file-a").with_caption("hello");

        let first = pipeline.ingest(&event, Utc::now()).unwrap();
        let IngestOutcome::Inserted(record) = first else {
            panic!("expected insert, got {:?}", first);
        };
        assert_eq!(record.category, Category::Two);
        assert_eq!(record.caption.as_deref(), Some("hello"));

        assert_eq!(
            pipeline.ingest(&event, Utc::now()).unwrap(),
            IngestOutcome::Duplicate(event.source())
        );
        assert_eq!(pipeline.content.count(Category::Two).unwrap(), 1);
        assert_eq!(pipeline.content.cursor(-1002).unwrap(), Some(10));
    }

    #[test]
    fn test_unmapped_channel() {
        let pipeline = pipeline();
        let result = pipeline.ingest(&ContentPosted::new(-9, 1, "x"), Utc::now());

        assert!(matches!(
            result,
            Err(IngestError::UnmappedChannel { channel_id: -9, message_seq: 1 })
        ));
        assert_eq!(pipeline.content.count_by_category().unwrap().values().sum::<u64>(), 0);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = IngestStats::default();
        stats.record(&Ok(IngestOutcome::Duplicate(SourceRef::new(1, 1))));
        stats.record(&Err(IngestError::UnmappedChannel {
            channel_id: 1,
            message_seq: 1,
        }));
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.unmapped, 1);
        assert_eq!(stats.total(), 2);
    }
}
