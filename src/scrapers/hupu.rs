//! Hupu (虎扑) hot threads.
//!
//! Hupu has no stable public API for its hot list, so this scraper tries, in
//! order:
//!
//! 1. the 步行街 board page, keeping elements whose class mentions a
//!    thread/post/topic/item;
//! 2. the homepage, keeping any sufficiently long link text;
//! 3. the `/api/list` JSON endpoint;
//!
//! and finally serves a placeholder.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::chain::{FetchChain, Outcome};
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::models::{TrendingItem, ranked};
use crate::utils::resolve_link;

pub const BBS_BASE: &str = "https://bbs.hupu.com";
pub const WWW_BASE: &str = "https://www.hupu.com";

const LIMIT: usize = 50;
const MIN_TITLE_CHARS: usize = 6;
const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

static CLASSED_BLOCK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr[class], li[class], div[class]").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static COUNTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?万?)\s*(?:回复|浏览|热度)|(?:回复|浏览|热度)\s*[:：]?\s*(\d+(?:\.\d+)?万?)")
        .unwrap()
});

const THREAD_CLASS_HINTS: [&str; 4] = ["thread", "post", "topic", "item"];
const BOARD_SKIP: [&str; 3] = ["登录", "注册", "首页"];
const HOME_SKIP: [&str; 4] = ["登录", "注册", "首页", "下载"];

fn clean_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|t| !t.is_empty()).join("")
}

fn usable_title(title: &str, skip: &[&str]) -> bool {
    title.chars().count() >= MIN_TITLE_CHARS && !skip.iter().any(|s| title.contains(s))
}

fn fallback_link(base: &str, title: &str) -> String {
    format!("{base}/search?q={}", urlencoding::encode(title))
}

/// Extract hot threads from the board page.
pub fn parse_board(html: &str) -> Vec<TrendingItem> {
    let document = Html::parse_document(html);
    let items = document
        .select(&CLASSED_BLOCK)
        .filter(|el| {
            el.value().attr("class").is_some_and(|class| {
                let class = class.to_lowercase();
                THREAD_CLASS_HINTS.iter().any(|hint| class.contains(hint))
            })
        })
        .filter_map(|el| {
            let anchor = el.select(&LINK).next()?;
            let title = clean_text(anchor);
            if !usable_title(&title, &BOARD_SKIP) {
                return None;
            }
            let link = anchor
                .value()
                .attr("href")
                .and_then(|href| resolve_link(BBS_BASE, href))
                .unwrap_or_else(|| fallback_link(WWW_BASE, &title));
            let block_text = el.text().collect::<String>();
            let popularity = COUNTER
                .captures(&block_text)
                .and_then(|c| c.get(1).or_else(|| c.get(2)))
                .map(|m| m.as_str().to_string());
            Some(TrendingItem {
                description: Some(format!("虎扑步行街热帖 - {title}")),
                link: Some(link),
                popularity,
                title,
                ..TrendingItem::default()
            })
        })
        .unique_by(|item| item.title.clone())
        .take(LIMIT)
        .collect();
    ranked(items)
}

/// Extract hot links from the homepage.
pub fn parse_homepage(html: &str) -> Vec<TrendingItem> {
    let document = Html::parse_document(html);
    let items = document
        .select(&LINK)
        .filter_map(|anchor| {
            let title = clean_text(anchor);
            if !usable_title(&title, &HOME_SKIP) {
                return None;
            }
            let link = anchor
                .value()
                .attr("href")
                .and_then(|href| resolve_link(WWW_BASE, href))
                .unwrap_or_else(|| fallback_link(WWW_BASE, &title));
            Some(TrendingItem {
                description: Some(format!("虎扑热门内容 - {title}")),
                link: Some(link),
                title,
                ..TrendingItem::default()
            })
        })
        .unique_by(|item| item.title.clone())
        .take(LIMIT)
        .collect();
    ranked(items)
}

/// Parse the `/api/list` JSON payload.
pub fn parse_api_list(body: &Value) -> Result<Vec<TrendingItem>, FetchError> {
    let data = body["data"]
        .as_array()
        .ok_or_else(|| FetchError::format("hupu api response lacks data[]"))?;
    let items = data
        .iter()
        .take(LIMIT)
        .map(|item| {
            let title = item["title"].as_str().unwrap_or_default().trim().to_string();
            let description = item["summary"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("虎扑内容 - {title}"));
            let popularity = match &item["reply_count"] {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            };
            TrendingItem {
                description: Some(description),
                link: item["url"].as_str().filter(|s| !s.is_empty()).map(str::to_string),
                popularity,
                title,
                ..TrendingItem::default()
            }
        })
        .collect();
    Ok(ranked(items))
}

fn non_empty(items: Vec<TrendingItem>, what: &str) -> Result<Vec<TrendingItem>, FetchError> {
    if items.is_empty() {
        Err(FetchError::format(format!("no hot items found on {what}")))
    } else {
        Ok(items)
    }
}

async fn fetch_board(http: &HttpClient, bbs: &str) -> Result<Vec<TrendingItem>, FetchError> {
    let html = http
        .get_text(
            &format!("{bbs}/bxj"),
            &[
                ("User-Agent", UA),
                ("Referer", "https://www.hupu.com/"),
                ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
                ("Accept-Language", "zh-CN,zh;q=0.9"),
            ],
        )
        .await?;
    let items = parse_board(&html);
    debug!(count = items.len(), "Parsed Hupu board page");
    non_empty(items, "board page")
}

async fn fetch_homepage(http: &HttpClient, www: &str) -> Result<Vec<TrendingItem>, FetchError> {
    let html = http
        .get_text(&format!("{www}/"), &[("User-Agent", UA), ("Referer", "https://www.hupu.com/")])
        .await?;
    non_empty(parse_homepage(&html), "homepage")
}

async fn fetch_api(http: &HttpClient, www: &str) -> Result<Vec<TrendingItem>, FetchError> {
    let body = http
        .get_json(&format!("{www}/api/list"), &[("User-Agent", UA), ("Referer", "https://www.hupu.com/")])
        .await?;
    non_empty(parse_api_list(&body)?, "api list")
}

fn placeholder() -> Vec<TrendingItem> {
    vec![TrendingItem::placeholder(
        "虎扑热榜数据获取中...",
        "虎扑体育、步行街热门话题和热议内容",
        "https://www.hupu.com/",
    )]
}

/// Hot threads from Hupu.
pub async fn trending(http: &HttpClient) -> Outcome<Vec<TrendingItem>> {
    trending_from(http, BBS_BASE, WWW_BASE).await
}

#[instrument(level = "info", skip(http))]
async fn trending_from(http: &HttpClient, bbs: &str, www: &str) -> Outcome<Vec<TrendingItem>> {
    let report = FetchChain::new("hupu-trending")
        .attempt("board", move || fetch_board(http, bbs))
        .attempt("homepage", move || fetch_homepage(http, www))
        .attempt("api-list", move || fetch_api(http, www))
        .placeholder("placeholder", placeholder)
        .run()
        .await;

    if let Some(items) = report.outcome.value() {
        info!(count = items.len(), "Fetched Hupu hot threads");
    }
    report.into_outcome()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BOARD: &str = r#"
        <html><body>
          <ul>
            <li class="bbs-sl-web-post-body">
              <div class="post-title"><a href="/61234567.html">湖人队今天又赢了一场比赛</a></div>
              <div class="post-datum">128回复 / 3.2万浏览</div>
            </li>
            <li class="bbs-sl-web-post-body">
              <a href="https://bbs.hupu.com/61234568.html">步行街今日话题讨论帖</a>
            </li>
            <li class="nav-item"><a href="/login">登录虎扑账号首页</a></li>
            <li class="other"><a href="/x">不是帖子的普通链接文字</a></li>
          </ul>
        </body></html>
    "#;

    #[test]
    fn test_parse_board() {
        let items = parse_board(BOARD);
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["湖人队今天又赢了一场比赛", "步行街今日话题讨论帖"]);

        assert_eq!(items[0].link.as_deref(), Some("https://bbs.hupu.com/61234567.html"));
        assert_eq!(items[0].popularity.as_deref(), Some("128"));
        assert_eq!(items[0].rank, Some(1));
        assert_eq!(items[1].link.as_deref(), Some("https://bbs.hupu.com/61234568.html"));
        assert_eq!(items[1].popularity, None);
    }

    #[test]
    fn test_parse_homepage_filters_short_and_nav_links() {
        let html = r#"
            <a href="/">首页</a>
            <a href="/app">下载虎扑客户端体验</a>
            <a href="https://nba.hupu.com/news/1">詹姆斯砍下三十分带队取胜</a>
            <a href="javascript:void(0)">没有真实地址的热门内容</a>
            <a href="https://nba.hupu.com/news/1">詹姆斯砍下三十分带队取胜</a>
        "#;
        let items = parse_homepage(html);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link.as_deref(), Some("https://nba.hupu.com/news/1"));
        assert!(items[1].link.as_deref().unwrap().starts_with("https://www.hupu.com/search?q="));
    }

    #[test]
    fn test_parse_api_list() {
        let body = json!({ "data": [
            { "title": " 热门话题 ", "url": "https://bbs.hupu.com/1.html", "reply_count": 12 },
            { "title": "无摘要" }
        ]});
        let items = parse_api_list(&body).unwrap();
        assert_eq!(items[0].title, "热门话题");
        assert_eq!(items[0].popularity.as_deref(), Some("12"));
        assert_eq!(items[1].description.as_deref(), Some("虎扑内容 - 无摘要"));
        assert_eq!(items[1].link, None);
    }

    #[test]
    fn test_counter_variants() {
        let c = COUNTER.captures("浏览：2.5万").unwrap();
        assert_eq!(c.get(1).or_else(|| c.get(2)).unwrap().as_str(), "2.5万");
    }

    #[tokio::test]
    async fn test_falls_through_to_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bxj"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>empty</body></html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [ { "title": "接口里的热门话题" } ]
            })))
            .mount(&server)
            .await;

        let http = HttpClient::new("test", Duration::from_secs(5)).unwrap();
        let uri = server.uri();
        let outcome = trending_from(&http, &uri, &uri).await;

        assert!(outcome.is_degraded());
        let reason = outcome.reason().unwrap().to_string();
        assert!(reason.contains("board") && reason.contains("homepage"));
        assert_eq!(outcome.into_value().unwrap()[0].title, "接口里的热门话题");
    }

    #[tokio::test]
    async fn test_placeholder_when_all_fail() {
        let http = HttpClient::new("test", Duration::from_secs(5)).unwrap();
        let outcome = trending_from(&http, "http://127.0.0.1:9", "http://127.0.0.1:9").await;
        assert!(outcome.value().unwrap()[0].is_placeholder());
    }
}
