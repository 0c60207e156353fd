//! Command-line interface definitions for Daily Hot News.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Most options can be provided via command-line flags or environment variables,
//! and override whatever the optional YAML config file says.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// The trending source to query.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// Bilibili video ranking (signed request)
    BilibiliRank,
    /// Bilibili popular videos (cached)
    BilibiliTrending,
    /// WeRead book ranking
    WereadRank,
    /// Weibo hot search
    WeiboTrending,
    /// Hupu hot threads
    HupuTrending,
}

/// Command-line arguments for the Daily Hot News application.
///
/// # Examples
///
/// ```sh
/// # Bilibili ranking for the music partition
/// daily_hot_news bilibili-rank --rank-type 3
///
/// # WeRead new-book list, with an in-memory cache
/// daily_hot_news weread-rank --category newbook --memory-cache
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Which trending source to fetch
    #[arg(value_enum)]
    pub source: Source,

    /// Optional path to config.yaml file
    #[arg(short, long, env = "DAILY_HOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for the file-backed cache
    #[arg(long, env = "DAILY_HOT_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Cache entry lifetime in minutes
    #[arg(long, env = "DAILY_HOT_CACHE_TTL_MINUTES")]
    pub cache_ttl_minutes: Option<u64>,

    /// Keep the cache in process memory instead of on disk
    #[arg(long)]
    pub memory_cache: bool,

    /// Drop every cached entry before fetching
    #[arg(long)]
    pub clear_cache: bool,

    /// Per-request HTTP timeout in seconds
    #[arg(long, env = "DAILY_HOT_HTTP_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Bilibili ranking partition (0 = all)
    #[arg(long, default_value_t = 0)]
    pub rank_type: u32,

    /// WeRead ranking category
    #[arg(long, default_value = "rising")]
    pub category: String,
}
