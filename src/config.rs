//! Configuration for reelbot.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (REELBOT_HOME, BOT_TOKEN, CATEGORY_1_CHANNEL, ...)
//! 2. Config file (.reelbot/config.yaml)
//! 3. Defaults (~/.reelbot)
//!
//! Config file discovery:
//! - Searches the working directory and its parents for .reelbot/config.yaml
//! - Paths in the config file are relative to the .reelbot/ directory
//!
//! The resolved config is passed down explicitly; there is no global.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{AdminSet, MixStrategyKind};
use crate::domain::{Category, UserId};

const DEFAULT_AUTO_DELETE_MINUTES: u64 = 10;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub channels: ChannelMap,
    #[serde(default)]
    pub admins: Vec<UserId>,
    #[serde(default)]
    pub auto_delete: Option<AutoDeleteSection>,
    pub sweep_interval_secs: Option<u64>,
    pub mix_strategy: Option<MixStrategyKind>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .reelbot/)
    pub home: Option<String>,
    /// SQLite file (relative to .reelbot/)
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    pub log_channel_id: Option<i64>,
    pub poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutoDeleteSection {
    pub enabled: Option<bool>,
    pub minutes: Option<u64>,
}

/// Which channel feeds which category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMap {
    pub category_1: Option<i64>,
    pub category_2: Option<i64>,
    pub category_3: Option<i64>,
    pub category_4: Option<i64>,
}

impl ChannelMap {
    pub fn new(category_1: i64, category_2: i64, category_3: i64, category_4: i64) -> Self {
        Self {
            category_1: Some(category_1),
            category_2: Some(category_2),
            category_3: Some(category_3),
            category_4: Some(category_4),
        }
    }

    pub fn channel_for(&self, category: Category) -> Option<i64> {
        match category {
            Category::One => self.category_1,
            Category::Two => self.category_2,
            Category::Three => self.category_3,
            Category::Four => self.category_4,
        }
    }

    pub fn category_of(&self, channel_id: i64) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| self.channel_for(*c) == Some(channel_id))
    }

    /// Categories with no channel configured
    pub fn missing(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.channel_for(*c).is_none())
            .collect()
    }

    /// Reject a map where one channel feeds two categories
    pub fn validate(&self) -> Result<()> {
        for (i, a) in Category::ALL.iter().enumerate() {
            for b in &Category::ALL[i + 1..] {
                if let (Some(x), Some(y)) = (self.channel_for(*a), self.channel_for(*b)) {
                    if x == y {
                        anyhow::bail!(
                            "Channel {} is mapped to both category {} and category {}",
                            x,
                            a,
                            b
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// All four channels must be set to run the bot
    pub fn require_complete(&self) -> Result<()> {
        let missing = self.missing();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|c| format!("CATEGORY_{}_CHANNEL", c)).collect();
            anyhow::bail!("Channel map incomplete, set {}", names.join(", "));
        }
        Ok(())
    }
}

/// Deleting sent videos after a delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoDelete {
    pub enabled: bool,
    pub minutes: u64,
}

impl Default for AutoDelete {
    fn default() -> Self {
        Self {
            enabled: true,
            minutes: DEFAULT_AUTO_DELETE_MINUTES,
        }
    }
}

impl AutoDelete {
    pub fn delay(&self) -> Option<Duration> {
        self.enabled.then(|| Duration::from_secs(self.minutes * 60))
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory (database, lock file)
    pub home: PathBuf,
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub bot_token: Option<String>,
    pub channels: ChannelMap,
    pub admins: AdminSet,
    /// Where new users and new videos are announced
    pub log_channel: Option<i64>,
    pub auto_delete: AutoDelete,
    pub sweep_interval: Duration,
    pub poll_timeout_secs: u64,
    pub mix_strategy: MixStrategyKind,
}

impl ResolvedConfig {
    /// Held by `serve` so only one poller runs per data directory
    pub fn lock_path(&self) -> PathBuf {
        self.home.join("reelbot.lock")
    }

    pub fn require_token(&self) -> Result<&str> {
        self.bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .context("BOT_TOKEN is not set")
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".reelbot").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn parse_env<T: std::str::FromStr>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", key, raw, e)),
        None => Ok(None),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Load configuration from the process environment and working directory
pub fn load() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    load_with(&|key| std::env::var(key).ok(), &cwd)
}

/// Load configuration with an injected environment lookup
pub fn load_with(env: &dyn Fn(&str) -> Option<String>, cwd: &Path) -> Result<ResolvedConfig> {
    let config_file = find_config_file(cwd);
    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };
    // Relative paths in the file are resolved against .reelbot/
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(cwd)
        .to_path_buf();

    let home = if let Some(env_home) = env("REELBOT_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = file.paths.home {
        resolve_path(&config_dir, home_path)
    } else {
        dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".reelbot")
    };

    let database = if let Some(env_db) = env("REELBOT_DB") {
        PathBuf::from(env_db)
    } else if let Some(ref db_path) = file.paths.database {
        resolve_path(&config_dir, db_path)
    } else {
        home.join("reelbot.db")
    };

    let bot_token = env("BOT_TOKEN").or(file.telegram.bot_token);

    let channels = ChannelMap {
        category_1: parse_env(env, "CATEGORY_1_CHANNEL")?.or(file.channels.category_1),
        category_2: parse_env(env, "CATEGORY_2_CHANNEL")?.or(file.channels.category_2),
        category_3: parse_env(env, "CATEGORY_3_CHANNEL")?.or(file.channels.category_3),
        category_4: parse_env(env, "CATEGORY_4_CHANNEL")?.or(file.channels.category_4),
    };
    channels.validate()?;

    let admins = match env("ADMIN_IDS") {
        Some(raw) => AdminSet::parse(&raw)?,
        None => AdminSet::new(file.admins),
    };

    let log_channel = parse_env(env, "LOG_CHANNEL_ID")?.or(file.telegram.log_channel_id);

    let file_auto_delete = file.auto_delete.unwrap_or_default();
    let enabled = match env("AUTO_DELETE_VIDEOS") {
        Some(raw) => parse_bool(&raw)
            .with_context(|| format!("Invalid AUTO_DELETE_VIDEOS={:?}", raw))?,
        None => file_auto_delete.enabled.unwrap_or(true),
    };
    let minutes = parse_env(env, "AUTO_DELETE_MINUTES")?
        .or(file_auto_delete.minutes)
        .unwrap_or(DEFAULT_AUTO_DELETE_MINUTES);
    if enabled && minutes == 0 {
        anyhow::bail!("AUTO_DELETE_MINUTES must be at least 1");
    }

    let sweep_interval = Duration::from_secs(
        parse_env(env, "SWEEP_INTERVAL_SECS")?
            .or(file.sweep_interval_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
            .max(1),
    );

    let mix_strategy = parse_env(env, "MIX_STRATEGY")?
        .or(file.mix_strategy)
        .unwrap_or_default();

    Ok(ResolvedConfig {
        home,
        database,
        config_file,
        bot_token,
        channels,
        admins,
        log_channel,
        auto_delete: AutoDelete { enabled, minutes },
        sweep_interval,
        poll_timeout_secs: file
            .telegram
            .poll_timeout_secs
            .unwrap_or(DEFAULT_POLL_TIMEOUT_SECS),
        mix_strategy,
    })
}
