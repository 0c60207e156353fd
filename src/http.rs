//! Thin HTTP transport shared by every scraper.
//!
//! One [`HttpClient`] is built at startup and handed to each component by
//! reference. It carries a default `User-Agent`, follows redirects, and
//! applies the per-request timeout.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::error::FetchError;
use crate::utils::truncate_for_log;

/// Shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    /// Build a client with the given default user agent and per-request timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        let inner = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { inner })
    }

    /// GET `url` and return the body as text. Non-2xx statuses are errors.
    #[instrument(level = "debug", skip(self, headers))]
    pub async fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let mut req = self.inner.get(url);
        for (name, value) in headers {
            match (HeaderName::try_from(*name), HeaderValue::from_str(value)) {
                (Ok(n), Ok(v)) => req = req.header(n, v),
                _ => warn!(header = %name, "Skipping invalid request header"),
            }
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = resp.text().await?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = body.len(),
            "GET complete"
        );
        Ok(body)
    }

    /// GET `url` and parse the body as JSON.
    pub async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, FetchError> {
        let body = self.get_text(url, headers).await?;
        serde_json::from_str(&body).map_err(|e| {
            FetchError::format(format!(
                "invalid JSON from {url}: {e} (body: {})",
                truncate_for_log(&body, 200)
            ))
        })
    }
}
