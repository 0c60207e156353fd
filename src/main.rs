//! # Daily Hot News
//!
//! Fetches trending lists from Chinese content platforms and prints them as
//! JSON.
//!
//! ## Features
//!
//! - WBI-signed requests to the Bilibili ranking API, with the signing keys
//!   cached between runs
//! - Opaque WeRead book identifiers derived from raw `bookId`s
//! - A TTL cache backed by process memory or by one JSON file per entry
//! - Ordered fallback chains per source that end in a placeholder item, so a
//!   request never fails because an upstream did
//!
//! ## Usage
//!
//! ```sh
//! daily_hot_news bilibili-rank --rank-type 3
//! daily_hot_news weibo-trending > weibo.json
//! ```
//!
//! Logs go to stderr; stdout carries only the JSON array.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod chain;
mod cli;
mod config;
mod error;
mod http;
mod ident;
mod models;
mod scrapers;
mod signing;
mod utils;

use cache::{FileStore, TtlCache};
use chain::Outcome;
use cli::{Cli, Source};
use config::AppConfig;
use http::HttpClient;
use models::TrendingItem;
use signing::{NavKeySource, SignatureEngine};
use utils::ensure_writable_dir;

/// Build the cache selected by the config.
async fn build_cache(config: &AppConfig) -> Result<TtlCache, Box<dyn Error>> {
    let ttl = config.cache_ttl()?;
    let cache = if config.memory_cache {
        info!("Using in-memory cache");
        TtlCache::in_memory(ttl)
    } else {
        let dir = config.cache_dir();
        if let Err(e) = ensure_writable_dir(&dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Cache directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
        let store = FileStore::open(&dir).await?;
        info!(path = %store.dir().display(), "Using file cache");
        TtlCache::new(Arc::new(store), ttl)
    };
    debug!(ttl_minutes = cache.ttl().num_minutes(), "Cache ready");
    Ok(cache)
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("daily_hot_news starting up");

    let args = Cli::parse();
    debug!(source = ?args.source, config = ?args.config, "Parsed CLI arguments");

    let config = AppConfig::resolve(&args).await?;
    debug!(?config, "Resolved configuration");

    // ---- Shared handles ----
    let cache = build_cache(&config).await?;
    if args.clear_cache {
        cache.clear().await;
        info!("Cache cleared");
    }
    let http = HttpClient::new(&config.user_agent, config.http_timeout())?;
    let api_base = config.bilibili_api_base.as_str();
    let engine = SignatureEngine::new(NavKeySource::new(&http, api_base), &cache);

    // ---- Fetch ----
    let outcome: Outcome<Vec<TrendingItem>> = match args.source {
        Source::BilibiliRank => scrapers::bilibili::rank(&http, &engine, api_base, args.rank_type).await?,
        Source::BilibiliTrending => scrapers::bilibili::trending(&http, &cache, api_base).await,
        Source::WereadRank => scrapers::weread::rank(&http, &args.category).await?,
        Source::WeiboTrending => scrapers::weibo::trending(&http).await,
        Source::HupuTrending => scrapers::hupu::trending(&http).await,
    };

    if outcome.is_degraded() {
        warn!(
            source = ?args.source,
            reason = outcome.reason().unwrap_or_default(),
            "Served a fallback result"
        );
    }

    let items = match outcome {
        Outcome::Failed(reason) => {
            error!(source = ?args.source, %reason, "No strategy produced a result");
            return Err(reason.into());
        }
        other => other.into_value().unwrap_or_default(),
    };

    let placeholders = items.iter().filter(|item| item.is_placeholder()).count();
    if placeholders > 0 {
        warn!(source = ?args.source, placeholders, "Upstream unavailable; output is a placeholder");
    }

    // ---- Output ----
    println!("{}", serde_json::to_string_pretty(&items)?);

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        count = items.len(),
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
