//! reelbot - Telegram video library bot
//!
//! Users browse four categories of videos (or a mix of all four), keep a few
//! short-lived bookmarks, vote on what they watch, and download videos while
//! a premium window is active. Videos arrive by watching four source
//! channels.
//!
//! # Modules
//!
//! - `domain`: Data structures (Category, VideoRecord, User, Bookmark)
//! - `store`: SQLite persistence
//! - `library`: The content store
//! - `ingest`: Channel post ingestion
//! - `core`: Entitlement, bookmarks, navigation, sessions, admin
//! - `adapters`: Transports (Telegram)
//! - `bot`: Update routing and rendering
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the bot
//! BOT_TOKEN=... reelbot serve
//!
//! # Backfill from a JSONL export
//! reelbot ingest posts.jsonl
//!
//! # Grant 30 days of premium
//! reelbot grant 123456789 --days 30
//! ```

pub mod adapters;
pub mod bot;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod library;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{Action, Response, SessionOrchestrator};
pub use domain::{Category, ContentPosted, Selection, User, VideoRecord};
pub use ingest::IngestionPipeline;
pub use library::ContentStore;
pub use store::Database;

// Telegram integration
pub use adapters::{TelegramClient, Transport};
