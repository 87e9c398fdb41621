//! Content ingestion from the monitored channels.
//!
//! ```text
//! channel_post (Telegram) ─┐
//!                          ├→ IngestionPipeline → ContentStore
//! events.jsonl (backfill) ─┘         ↓
//!                            inserted records → log channel
//! ```

pub mod pipeline;

// Re-export key types
pub use pipeline::{IngestError, IngestOutcome, IngestStats, IngestionPipeline};
