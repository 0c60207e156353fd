//! Bilibili video rankings.
//!
//! Two lists are exposed:
//! - **rank**: per-partition ranking. The primary endpoint (`ranking/v2`)
//!   requires a WBI signature; the legacy `ranking` endpoint is the fallback.
//! - **trending**: the "popular" feed, memoized in the TTL cache.
//!
//! Both end in a placeholder item so the caller always gets a list back.

use chrono::DateTime;
use serde_json::Value;
use std::error::Error;
use tracing::{info, instrument, warn};

use crate::cache::TtlCache;
use crate::chain::{FetchChain, Outcome};
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::models::{TrendingItem, ranked};
use crate::signing::{BILIBILI_USER_AGENT, KeySource, SignatureEngine};

/// Partitions accepted by the ranking endpoint.
pub const RANK_TYPES: [u32; 12] = [0, 1, 3, 4, 5, 188, 119, 129, 155, 160, 168, 181];

pub const TRENDING_CACHE_KEY: &str = "bilibili_trending";
const TRENDING_LIMIT: usize = 20;
const NO_DESCRIPTION: &str = "该视频暂无简介";

fn video_link(item: &Value) -> Option<String> {
    match item["short_link_v2"].as_str().filter(|s| !s.is_empty()) {
        Some(short) => Some(short.to_string()),
        None => item["bvid"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|bvid| format!("https://www.bilibili.com/video/{bvid}")),
    }
}

fn description(item: &Value) -> String {
    item["desc"]
        .as_str()
        .filter(|s| !s.is_empty())
        .unwrap_or(NO_DESCRIPTION)
        .to_string()
}

fn non_empty(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Unwrap the `{ code, message, data: { list } }` envelope.
fn data_list(body: &Value) -> Result<&Vec<Value>, FetchError> {
    let code = body["code"].as_i64().unwrap_or(-1);
    if code != 0 {
        let message = body["message"].as_str().unwrap_or("获取B站排行榜失败");
        return Err(FetchError::format(format!("bilibili code {code}: {message}")));
    }
    body["data"]["list"]
        .as_array()
        .ok_or_else(|| FetchError::format("bilibili response lacks data.list"))
}

/// Parse a `ranking/v2` or `popular` response.
pub fn parse_rank_v2(body: &Value) -> Result<Vec<TrendingItem>, FetchError> {
    let items = data_list(body)?
        .iter()
        .map(|item| TrendingItem {
            title: item["title"].as_str().unwrap_or_default().to_string(),
            description: Some(description(item)),
            cover: non_empty(&item["pic"]),
            author: non_empty(&item["owner"]["name"]),
            popularity: Some(item["stat"]["view"].as_u64().unwrap_or(0).to_string()),
            publish_time: item["pubdate"]
                .as_i64()
                .filter(|ts| *ts > 0)
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.to_rfc3339()),
            link: video_link(item),
            ..TrendingItem::default()
        })
        .collect();
    Ok(items)
}

/// Parse the legacy `ranking` response.
pub fn parse_rank_legacy(body: &Value) -> Result<Vec<TrendingItem>, FetchError> {
    let items = data_list(body)?
        .iter()
        .map(|item| TrendingItem {
            title: item["title"].as_str().unwrap_or_default().to_string(),
            description: Some(description(item)),
            cover: non_empty(&item["pic"]),
            author: non_empty(&item["author"]),
            popularity: Some(item["video_review"].as_u64().unwrap_or(0).to_string()),
            link: item["bvid"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(|bvid| format!("https://www.bilibili.com/video/{bvid}")),
            ..TrendingItem::default()
        })
        .collect();
    Ok(items)
}

fn placeholder() -> Vec<TrendingItem> {
    vec![TrendingItem::placeholder(
        "哔哩哔哩排行榜数据获取中...",
        "哔哩哔哩热门视频排行",
        "https://www.bilibili.com/v/popular/rank/all",
    )]
}

async fn fetch_rank_v2(
    http: &HttpClient,
    query: Option<&str>,
    api_base: &str,
    rank_type: u32,
) -> Result<Vec<TrendingItem>, FetchError> {
    let query = query.ok_or_else(|| FetchError::AcquisitionFailure("no query to sign".into()))?;
    let url = format!("{api_base}/x/web-interface/ranking/v2?rid={rank_type}&type=all&{query}");
    let body = http
        .get_json(
            &url,
            &[
                ("Referer", "https://www.bilibili.com/ranking/all"),
                ("User-Agent", BILIBILI_USER_AGENT),
                (
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
                ),
                ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
            ],
        )
        .await?;
    parse_rank_v2(&body)
}

async fn fetch_rank_legacy(
    http: &HttpClient,
    api_base: &str,
    rank_type: u32,
) -> Result<Vec<TrendingItem>, FetchError> {
    let url = format!(
        "{api_base}/x/web-interface/ranking?jsonp=jsonp?rid={rank_type}&type=all&callback=__jp0"
    );
    let body = http
        .get_json(
            &url,
            &[
                ("Referer", "https://www.bilibili.com/ranking/all"),
                ("User-Agent", BILIBILI_USER_AGENT),
            ],
        )
        .await?;
    parse_rank_legacy(&body)
}

/// Ranking for one partition (see [`RANK_TYPES`]).
///
/// Fails only on an unsupported `rank_type`; upstream trouble degrades to the
/// legacy endpoint and then to a placeholder.
#[instrument(level = "info", skip(http, engine))]
pub async fn rank<K: KeySource>(
    http: &HttpClient,
    engine: &SignatureEngine<'_, K>,
    api_base: &str,
    rank_type: u32,
) -> Result<Outcome<Vec<TrendingItem>>, Box<dyn Error>> {
    if !RANK_TYPES.contains(&rank_type) {
        return Err(format!("unsupported bilibili rank type: {rank_type}").into());
    }

    let signing = engine.signed_query().await;
    if let Some(reason) = signing.reason() {
        warn!(%reason, "Requesting ranking/v2 without a valid signature");
    }
    let query = signing.value().map(String::as_str);

    let report = FetchChain::new("bilibili-rank")
        .attempt("ranking-v2", move || fetch_rank_v2(http, query, api_base, rank_type))
        .attempt("ranking-legacy", move || fetch_rank_legacy(http, api_base, rank_type))
        .placeholder("placeholder", placeholder)
        .run()
        .await;

    if let Some(items) = report.outcome.value() {
        info!(count = items.len(), "Fetched bilibili ranking");
    }
    // an unsigned v2 answer is still a fallback
    let outcome = match (report.into_outcome(), signing.reason()) {
        (Outcome::Ok(value), Some(reason)) => Outcome::Degraded {
            value,
            reason: format!("ranking-v2 sent unsigned: {reason}"),
        },
        (outcome, _) => outcome,
    };
    Ok(outcome)
}

async fn fetch_popular(http: &HttpClient, api_base: &str) -> Result<Vec<TrendingItem>, FetchError> {
    let url = format!("{api_base}/x/web-interface/popular");
    let body = http
        .get_json(&url, &[("Referer", "https://www.bilibili.com/")])
        .await?;
    let items = parse_rank_v2(&body)?.into_iter().take(TRENDING_LIMIT).collect();
    Ok(ranked(items))
}

/// Popular videos, top 20. Real results are cached for the cache TTL.
#[instrument(level = "info", skip(http, cache))]
pub async fn trending(
    http: &HttpClient,
    cache: &TtlCache,
    api_base: &str,
) -> Outcome<Vec<TrendingItem>> {
    if let Some(items) = cache.get::<Vec<TrendingItem>>(TRENDING_CACHE_KEY).await {
        info!(count = items.len(), "Serving bilibili trending from cache");
        return Outcome::Ok(items);
    }

    let report = FetchChain::new("bilibili-trending")
        .attempt("popular", move || fetch_popular(http, api_base))
        .placeholder("placeholder", placeholder)
        .run()
        .await;

    if let Outcome::Ok(items) = &report.outcome {
        cache.set(TRENDING_CACHE_KEY, items).await;
        info!(count = items.len(), "Fetched bilibili trending");
    }
    report.into_outcome()
}
