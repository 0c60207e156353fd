//! Weibo hot search (微博热搜).
//!
//! Both strategies hit the mobile container API, which is steadier than the
//! PC endpoints. The first carries the full parameter set and filters ads; the
//! second is a simplified query.

use serde_json::Value;
use tracing::{info, instrument};

use crate::chain::{FetchChain, Outcome};
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::models::{TrendingItem, ranked};

pub const WEIBO_BASE: &str = "https://m.weibo.cn";

const MOBILE_PATH: &str = "/api/container/getIndex?containerid=106003type%3D25%26t%3D3%26disable_hot%3D1%26filter_type%3Drealtimehot&title=%E5%BE%AE%E5%8D%9A%E7%83%AD%E6%90%9C&extparam=filter_type%3Drealtimehot%26mi_cid%3D100103%26pos%3D0_0%26c_type%3D30%26display_time%3D1540538388&luicode=10000011&lfid=231583";
const LITE_PATH: &str =
    "/api/container/getIndex?containerid=106003type=25&t=3&disable_hot=1&filter_type=realtimehot";
const MOBILE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1";

/// Search page for a hot-search topic.
pub fn search_link(topic: &str, ranked_search: bool) -> String {
    let q = urlencoding::encode(&format!("#{topic}#")).into_owned();
    if ranked_search {
        format!("https://s.weibo.com/weibo?q={q}&band_rank=1&Refer=top")
    } else {
        format!("https://s.weibo.com/weibo?q={q}")
    }
}

fn card_group(body: &Value) -> Result<&Vec<Value>, FetchError> {
    body["data"]["cards"]
        .as_array()
        .filter(|cards| !cards.is_empty())
        .and_then(|cards| cards[0]["card_group"].as_array())
        .ok_or_else(|| FetchError::format("weibo response lacks data.cards[0].card_group"))
}

fn is_ad(item: &Value) -> bool {
    item["actionlog"]["ext"]
        .as_str()
        .is_some_and(|ext| ext.contains("ads_word"))
}

/// Parse a container response. `ranked_search` selects the link flavour and
/// turns on ad filtering.
pub fn parse_hot_search(body: &Value, ranked_search: bool) -> Result<Vec<TrendingItem>, FetchError> {
    let items: Vec<TrendingItem> = card_group(body)?
        .iter()
        .filter(|item| !(ranked_search && is_ad(item)))
        .filter_map(|item| item["desc"].as_str().filter(|d| !d.is_empty()))
        .map(|desc| TrendingItem {
            title: desc.to_string(),
            description: Some(desc.to_string()),
            link: Some(search_link(desc, ranked_search)),
            ..TrendingItem::default()
        })
        .collect();

    if items.is_empty() {
        return Err(FetchError::format("weibo card group has no topics"));
    }
    Ok(ranked(items))
}

async fn fetch_mobile(http: &HttpClient, base: &str) -> Result<Vec<TrendingItem>, FetchError> {
    let body = http
        .get_json(
            &format!("{base}{MOBILE_PATH}"),
            &[
                ("Accept", "application/json, text/plain, */*"),
                ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
                ("Cache-Control", "no-cache"),
                ("Pragma", "no-cache"),
                ("Referer", "https://s.weibo.com/top/summary?cate=realtimehot"),
                ("User-Agent", MOBILE_UA),
                ("mweibo-pwa", "1"),
                ("x-requested-with", "XMLHttpRequest"),
                ("sec-fetch-dest", "empty"),
                ("sec-fetch-mode", "cors"),
                ("sec-fetch-site", "same-origin"),
            ],
        )
        .await?;
    parse_hot_search(&body, true)
}

async fn fetch_lite(http: &HttpClient, base: &str) -> Result<Vec<TrendingItem>, FetchError> {
    let body = http
        .get_json(
            &format!("{base}{LITE_PATH}"),
            &[
                ("User-Agent", MOBILE_UA),
                ("Referer", "https://m.weibo.cn/"),
                ("Accept", "application/json, text/plain, */*"),
                ("Accept-Language", "zh-CN,zh;q=0.9"),
            ],
        )
        .await?;
    parse_hot_search(&body, false)
}

fn placeholder() -> Vec<TrendingItem> {
    vec![TrendingItem::placeholder(
        "微博热搜数据获取中...",
        "微博实时热搜榜",
        "https://s.weibo.com/top/summary?cate=realtimehot",
    )]
}

/// Current hot-search topics.
pub async fn trending(http: &HttpClient) -> Outcome<Vec<TrendingItem>> {
    trending_from(http, WEIBO_BASE).await
}

#[instrument(level = "info", skip(http))]
async fn trending_from(http: &HttpClient, base: &str) -> Outcome<Vec<TrendingItem>> {
    let report = FetchChain::new("weibo-trending")
        .attempt("mobile-api", move || fetch_mobile(http, base))
        .attempt("mobile-lite", move || fetch_lite(http, base))
        .placeholder("placeholder", placeholder)
        .run()
        .await;

    if let Some(items) = report.outcome.value() {
        info!(count = items.len(), "Fetched Weibo hot search");
    }
    report.into_outcome()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body() -> Value {
        json!({
            "data": { "cards": [ { "card_group": [
                { "desc": "" },
                { "desc": "话题一" },
                { "desc": "推广", "actionlog": { "ext": "seat:1|ads_word:推广" } },
                { "desc": "话题 二" }
            ]}]}
        })
    }

    #[test]
    fn test_search_link_encoding() {
        assert_eq!(
            search_link("话题", true),
            "https://s.weibo.com/weibo?q=%23%E8%AF%9D%E9%A2%98%23&band_rank=1&Refer=top"
        );
        assert_eq!(search_link("a b", false), "https://s.weibo.com/weibo?q=%23a%20b%23");
    }

    #[test]
    fn test_parse_filters_ads_and_blank_rows() {
        let items = parse_hot_search(&body(), true).unwrap();
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["话题一", "话题 二"]);
        assert_eq!(items[1].rank, Some(2));
    }

    #[test]
    fn test_lite_parse_keeps_ads() {
        let items = parse_hot_search(&body(), false).unwrap();
        assert_eq!(items.len(), 3);
        assert!(!items[0].link.as_deref().unwrap().contains("band_rank"));
    }

    #[test]
    fn test_parse_rejects_empty_cards() {
        assert!(parse_hot_search(&json!({ "data": { "cards": [] } }), true).is_err());
        assert!(parse_hot_search(&json!({ "ok": 0 }), true).is_err());
        assert!(parse_hot_search(&json!({ "data": { "cards": [ { "card_group": [] } ] } }), true).is_err());
    }

    #[tokio::test]
    async fn test_falls_back_to_lite_endpoint() {
        let server = MockServer::start().await;
        // the full query carries `luicode`; answer it with an error page
        Mock::given(method("GET"))
            .and(path("/api/container/getIndex"))
            .and(query_param("luicode", "10000011"))
            .respond_with(ResponseTemplate::new(432))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/container/getIndex"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body()))
            .mount(&server)
            .await;

        let http = HttpClient::new("test", Duration::from_secs(5)).unwrap();
        let outcome = trending_from(&http, &server.uri()).await;

        assert!(outcome.is_degraded());
        assert!(outcome.reason().unwrap().contains("mobile-api"));
        assert_eq!(outcome.value().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_placeholder_when_everything_fails() {
        let http = HttpClient::new("test", Duration::from_secs(5)).unwrap();
        let outcome = trending_from(&http, "http://127.0.0.1:9").await;
        let items = outcome.into_value().unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_placeholder());
    }
}
