//! Command-line interface for reelbot.
//!
//! Runs the bot, backfills the library from JSONL, and gives the local
//! operator the same admin operations the bot offers to admins.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use fs2::FileExt;

use crate::bot;
use crate::config::{self, ResolvedConfig};
use crate::core::{AdminService, BookmarkManager, EntitlementManager, Operator};
use crate::domain::{Category, UserId};
use crate::ingest::IngestionPipeline;
use crate::library::ContentStore;
use crate::store::Database;

/// reelbot - Telegram video library bot
#[derive(Parser, Debug)]
#[command(name = "reelbot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bot (long polling)
    Serve {
        /// Bot token (overrides config)
        #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Backfill the library from a JSONL file of channel posts
    Ingest {
        /// One ContentPosted JSON object per line
        file: PathBuf,
    },

    /// Grant premium to a user, starting now
    Grant {
        user_id: UserId,

        /// Length of the premium window
        #[arg(short, long)]
        days: i64,
    },

    /// Remove a user's premium window
    Revoke { user_id: UserId },

    /// Show users, premium users and videos per category
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete expired bookmarks and premium windows now
    Sweep,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let mut cfg = config::load()?;

        match self.command {
            Commands::Serve { token } => {
                if token.is_some() {
                    cfg.bot_token = token;
                }
                serve(&cfg).await
            }
            Commands::Ingest { file } => ingest_file(&cfg, &file).await,
            Commands::Grant { user_id, days } => grant(&cfg, user_id, days),
            Commands::Revoke { user_id } => revoke(&cfg, user_id),
            Commands::Stats { json } => show_stats(&cfg, json),
            Commands::Sweep => sweep(&cfg),
            Commands::Config => show_config(&cfg),
        }
    }
}

fn open_content(cfg: &ResolvedConfig) -> Result<ContentStore> {
    let db = Database::open(&cfg.database)
        .with_context(|| format!("Failed to open database: {}", cfg.database.display()))?;
    Ok(ContentStore::new(db))
}

/// Run the bot while holding the data directory lock
async fn serve(cfg: &ResolvedConfig) -> Result<()> {
    std::fs::create_dir_all(&cfg.home)
        .with_context(|| format!("Failed to create {}", cfg.home.display()))?;

    let lock_path = cfg.lock_path();
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
    lock_file.try_lock_exclusive().with_context(|| {
        format!(
            "Another reelbot is already serving from {}",
            cfg.home.display()
        )
    })?;

    let content = open_content(cfg)?;
    let result = bot::serve(cfg, content).await;
    drop(lock_file);
    result
}

async fn ingest_file(cfg: &ResolvedConfig, file: &Path) -> Result<()> {
    cfg.channels.require_complete()?;

    let pipeline = IngestionPipeline::new(open_content(cfg)?, cfg.channels);
    let stats = pipeline
        .ingest_file(file)
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))?;

    println!("Inserted:   {}", stats.inserted);
    println!("Duplicates: {}", stats.duplicates);
    println!("Unmapped:   {}", stats.unmapped);
    println!("Failed:     {}", stats.failed);
    Ok(())
}

fn grant(cfg: &ResolvedConfig, user_id: UserId, days: i64) -> Result<()> {
    let admin = AdminService::new(open_content(cfg)?);
    let window = admin.grant_premium(Operator::local(), user_id, days, Utc::now())?;
    println!("Premium granted to {} until {}", user_id, window.expires_at);
    Ok(())
}

fn revoke(cfg: &ResolvedConfig, user_id: UserId) -> Result<()> {
    let admin = AdminService::new(open_content(cfg)?);
    admin.revoke_premium(Operator::local(), user_id)?;
    println!("Premium removed from {}", user_id);
    Ok(())
}

fn show_stats(cfg: &ResolvedConfig, json: bool) -> Result<()> {
    let admin = AdminService::new(open_content(cfg)?);
    let stats = admin.stats(Operator::local(), Utc::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Users:         {}", stats.total_users);
    println!("Premium users: {}", stats.premium_users);
    println!("Videos:        {}", stats.total_videos());
    println!();
    println!("{:<12} {:>8} {:>16} {:>10}", "CATEGORY", "VIDEOS", "CHANNEL", "CURSOR");
    println!("{}", "-".repeat(49));
    for category in Category::ALL {
        let channel = cfg.channels.channel_for(category);
        let cursor = channel.and_then(|c| stats.cursors.get(&c).copied());
        println!(
            "{:<12} {:>8} {:>16} {:>10}",
            format!("Category {}", category),
            stats.counts_by_category.get(&category).copied().unwrap_or(0),
            channel.map_or_else(|| "-".to_string(), |c| c.to_string()),
            cursor.map_or_else(|| "-".to_string(), |c| c.to_string()),
        );
    }
    Ok(())
}

fn sweep(cfg: &ResolvedConfig) -> Result<()> {
    let content = open_content(cfg)?;
    let db = content.database().clone();
    let now = Utc::now();

    let bookmarks = BookmarkManager::new(db.clone()).sweep(now)?;
    let premium = EntitlementManager::new(db).sweep(now)?;
    println!("Removed {} expired bookmarks, cleared {} expired premium windows", bookmarks, premium);
    Ok(())
}

fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("reelbot configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.database.display());
    println!("  Lock:     {}", cfg.lock_path().display());
    println!();
    println!("Telegram:");
    println!("  Bot token:   {}", if cfg.bot_token.is_some() { "(set)" } else { "(not set)" });
    println!(
        "  Log channel: {}",
        cfg.log_channel.map_or_else(|| "(none)".to_string(), |c| c.to_string())
    );
    println!();
    println!("Channels:");
    for category in Category::ALL {
        println!(
            "  Category {}: {}",
            category,
            cfg.channels
                .channel_for(category)
                .map_or_else(|| "(not set)".to_string(), |c| c.to_string())
        );
    }
    println!();
    println!("Admins: {}", cfg.admins.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", "));
    println!(
        "Auto-delete: {}",
        if cfg.auto_delete.enabled {
            format!("after {} min", cfg.auto_delete.minutes)
        } else {
            "off".to_string()
        }
    );
    println!("Sweep interval: {}s", cfg.sweep_interval.as_secs());
    println!("Mix strategy: {:?}", cfg.mix_strategy);

    Ok(())
}
