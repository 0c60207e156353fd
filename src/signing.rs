//! WBI request signing for the Bilibili web API.
//!
//! Bilibili's ranking endpoints expect every query to carry a `wts`
//! timestamp and a `w_rid` signature. The signature is an MD5 over the sorted
//! query string salted with a "mixin key", which is a fixed permutation of two
//! rotating key fragments published by the `nav` endpoint.
//!
//! [`SignatureEngine`] ties the pieces together: it keeps the key pair in the
//! [`TtlCache`], fetches it through a [`KeySource`] on a miss, and degrades to
//! an unsigned query when the keys cannot be obtained.

use async_trait::async_trait;
use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::cache::TtlCache;
use crate::chain::Outcome;
use crate::error::FetchError;
use crate::http::HttpClient;

/// Cache key under which the key pair is memoized.
pub const KEY_CACHE_KEY: &str = "bilibili-wbi-keys";

/// Query served when no key material is available.
pub const UNSIGNED_QUERY_PREFIX: &str = "foo=114&bar=514&baz=1919810";

pub const BILIBILI_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// Character positions taken from `img_key + sub_key` to build the mixin key.
pub const MIXIN_KEY_ORDER: [usize; 64] = [
    46, 47, 18, 2, 53, 8, 23, 32, 15, 50, 10, 31, 58, 3, 45, 35, 27, 43, 5, 49, 33, 9, 42, 19, 29,
    28, 14, 39, 12, 38, 41, 13, 37, 48, 7, 16, 24, 55, 40, 61, 26, 17, 0, 1, 60, 51, 30, 4, 22, 25,
    54, 21, 56, 59, 6, 63, 57, 62, 11, 36, 20, 34, 44, 52,
];

const STRIPPED_CHARS: [char; 5] = ['!', '\'', '(', ')', '*'];

/// The two rotating key fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeyPair {
    pub image_key: String,
    pub sub_key: String,
}

/// A signed query: the sorted base query and the same query with `w_rid` appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedQuery {
    pub query_string: String,
    pub signature: String,
}

/// Derive the 32-character mixin key. Out-of-range positions are skipped.
pub fn mixin_key(keys: &SigningKeyPair) -> String {
    let full: Vec<char> = keys.image_key.chars().chain(keys.sub_key.chars()).collect();
    MIXIN_KEY_ORDER
        .iter()
        .filter_map(|&i| full.get(i))
        .take(32)
        .collect()
}

/// Sign `params` with the current Unix time as `wts`.
pub fn sign(params: &BTreeMap<String, String>, keys: &SigningKeyPair) -> SignedQuery {
    sign_at(params, keys, Utc::now().timestamp())
}

/// Sign `params` with an explicit `wts`.
pub fn sign_at(params: &BTreeMap<String, String>, keys: &SigningKeyPair, wts: i64) -> SignedQuery {
    let mut params = params.clone();
    params.insert("wts".to_string(), wts.to_string());

    let query_string = params
        .iter()
        .map(|(k, v)| {
            let clean: String = v.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect();
            format!("{k}={clean}")
        })
        .join("&");

    let w_rid = format!("{:x}", md5::compute(format!("{query_string}{}", mixin_key(keys))));
    let signature = format!("{query_string}&w_rid={w_rid}");
    SignedQuery {
        query_string,
        signature,
    }
}

/// The degraded query used when key material is unavailable.
pub fn unsigned_query(wts: i64) -> String {
    format!("{UNSIGNED_QUERY_PREFIX}&wts={wts}")
}

/// The parameter set Bilibili's web client signs for ranking requests.
pub fn canonical_params() -> BTreeMap<String, String> {
    [("foo", "114"), ("bar", "514"), ("baz", "1919810")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Text between the last `/` and the first `.` after it.
pub fn filename_stem(url: &str) -> &str {
    let name = url.rsplit('/').next().unwrap_or(url);
    name.split('.').next().unwrap_or(name)
}

/// Somewhere signing keys can be obtained from.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch_keys(&self) -> Result<SigningKeyPair, FetchError>;
}

/// Reads the key pair from `GET /x/web-interface/nav`.
#[derive(Debug, Clone)]
pub struct NavKeySource<'a> {
    http: &'a HttpClient,
    api_base: String,
}

impl<'a> NavKeySource<'a> {
    pub fn new(http: &'a HttpClient, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Pull the key pair out of a `nav` response body.
pub fn keys_from_nav(body: &Value) -> Result<SigningKeyPair, FetchError> {
    let wbi = &body["data"]["wbi_img"];
    let stem = |field: &str| -> Result<String, FetchError> {
        let url = wbi[field]
            .as_str()
            .ok_or_else(|| FetchError::AcquisitionFailure(format!("nav response lacks wbi_img.{field}")))?;
        let stem = filename_stem(url);
        if stem.is_empty() {
            return Err(FetchError::AcquisitionFailure(format!(
                "wbi_img.{field} has no file name: {url:?}"
            )));
        }
        Ok(stem.to_string())
    };
    Ok(SigningKeyPair {
        image_key: stem("img_url")?,
        sub_key: stem("sub_url")?,
    })
}

#[async_trait]
impl<'a> KeySource for NavKeySource<'a> {
    #[instrument(level = "info", skip_all)]
    async fn fetch_keys(&self) -> Result<SigningKeyPair, FetchError> {
        let url = format!("{}/x/web-interface/nav", self.api_base);
        // nav answers with code -101 when logged out but still includes wbi_img
        let body = self
            .http
            .get_json(
                &url,
                &[
                    ("Cookie", "SESSDATA=xxxxxx"),
                    ("User-Agent", BILIBILI_USER_AGENT),
                    ("Referer", "https://www.bilibili.com/"),
                ],
            )
            .await
            .map_err(|e| FetchError::AcquisitionFailure(e.to_string()))?;
        let keys = keys_from_nav(&body)?;
        info!("Fetched WBI key material");
        Ok(keys)
    }
}

/// Produces signed query strings, caching the key pair between calls.
#[derive(Debug)]
pub struct SignatureEngine<'c, K> {
    keys: K,
    cache: &'c TtlCache,
}

impl<'c, K: KeySource> SignatureEngine<'c, K> {
    pub fn new(keys: K, cache: &'c TtlCache) -> Self {
        Self { keys, cache }
    }

    /// Cached key pair, or a freshly fetched one (which is then cached).
    pub async fn key_pair(&self) -> Result<SigningKeyPair, FetchError> {
        if let Some(keys) = self.cache.get::<SigningKeyPair>(KEY_CACHE_KEY).await {
            debug!("Using cached WBI keys");
            return Ok(keys);
        }
        let keys = self.keys.fetch_keys().await?;
        self.cache.set(KEY_CACHE_KEY, &keys).await;
        Ok(keys)
    }

    /// Sign the canonical `foo/bar/baz` parameter set.
    pub async fn signed_query(&self) -> Outcome<String> {
        self.sign_params(&canonical_params()).await
    }

    /// Sign `params`, or fall back to the unsigned query if keys are unavailable.
    #[instrument(level = "info", skip_all)]
    pub async fn sign_params(&self, params: &BTreeMap<String, String>) -> Outcome<String> {
        match self.key_pair().await {
            Ok(keys) => Outcome::Ok(sign(params, &keys).signature),
            Err(e) => {
                warn!(error = %e, "WBI key acquisition failed; sending unsigned query");
                Outcome::Degraded {
                    value: unsigned_query(Utc::now().timestamp()),
                    reason: e.to_string(),
                }
            }
        }
    }
}
