//! WeRead (微信读书) book rankings.
//!
//! The ranking API returns raw `bookId`s; detail links use the opaque
//! identifier from [`crate::ident::derive`].

use serde_json::Value;
use std::error::Error;
use tracing::{info, instrument};

use crate::chain::{FetchChain, Outcome};
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::ident;
use crate::models::{TrendingItem, ranked};

pub const WEREAD_BASE: &str = "https://weread.qq.com";

/// Ranking categories the API accepts.
pub const CATEGORIES: [&str; 5] = ["rising", "hot_search", "newbook", "general_novel_rising", "all"];

/// Detail page for a raw `bookId`.
pub fn book_link(book_id: &str) -> String {
    format!("{WEREAD_BASE}/web/bookDetail/{}", ident::derive(book_id))
}

/// Parse a `bookListInCategory` response.
pub fn parse_books(body: &Value) -> Result<Vec<TrendingItem>, FetchError> {
    let books = body["books"]
        .as_array()
        .ok_or_else(|| FetchError::format("weread response lacks books[]"))?;

    let items = books
        .iter()
        .map(|entry| {
            let info = &entry["bookInfo"];
            let text = |key: &str| {
                info[key]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            let book_id = match &info["bookId"] {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => String::new(),
            };
            TrendingItem {
                title: text("title").unwrap_or_default(),
                description: text("intro"),
                author: text("author"),
                publish_time: text("publishTime"),
                popularity: Some(entry["readingCount"].as_u64().unwrap_or(0).to_string()),
                cover: text("cover").map(|c| c.replace("s_", "t9_")),
                link: (!book_id.is_empty()).then(|| book_link(&book_id)),
                ..TrendingItem::default()
            }
        })
        .collect();
    Ok(ranked(items))
}

async fn fetch_books(http: &HttpClient, base: &str, category: &str) -> Result<Vec<TrendingItem>, FetchError> {
    let url = format!("{base}/web/bookListInCategory/{category}?rank=1");
    let body = http.get_json(&url, &[]).await?;
    parse_books(&body)
}

fn placeholder() -> Vec<TrendingItem> {
    vec![TrendingItem::placeholder(
        "微信读书排行榜数据获取中...",
        "微信读书热门书籍排行",
        "https://weread.qq.com/web/category",
    )]
}

/// Ranking for one of [`CATEGORIES`].
pub async fn rank(http: &HttpClient, category: &str) -> Result<Outcome<Vec<TrendingItem>>, Box<dyn Error>> {
    rank_from(http, WEREAD_BASE, category).await
}

#[instrument(level = "info", skip(http))]
async fn rank_from(
    http: &HttpClient,
    base: &str,
    category: &str,
) -> Result<Outcome<Vec<TrendingItem>>, Box<dyn Error>> {
    if !CATEGORIES.contains(&category) {
        return Err(format!("unsupported weread category: {category}").into());
    }

    let report = FetchChain::new("weread-rank")
        .attempt("book-list", move || fetch_books(http, base, category))
        .placeholder("placeholder", placeholder)
        .run()
        .await;

    if let Some(items) = report.outcome.value() {
        info!(count = items.len(), "Fetched WeRead ranking");
    }
    Ok(report.into_outcome())
}
