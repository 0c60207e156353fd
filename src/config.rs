//! Runtime configuration.
//!
//! Settings come from three layers, highest precedence first: CLI flags (or
//! their environment variables), an optional `config.yaml`, and built-in
//! defaults.
//!
//! ```yaml
//! cache_ttl_minutes: 30
//! cache_dir: /var/cache/daily_hot_news
//! http_timeout_secs: 30
//! user_agent: "Mozilla/5.0 ..."
//! bilibili_api_base: https://api.bilibili.com
//! ```

use crate::cli::Cli;
use serde::Deserialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_CACHE_TTL_MINUTES: u64 = 30;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
pub const DEFAULT_BILIBILI_API_BASE: &str = "https://api.bilibili.com";

/// Effective application settings after all layers are merged.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Lifetime of every cache entry, in minutes.
    pub cache_ttl_minutes: u64,
    /// Directory for the file-backed cache. `None` means `<tmp>/daily_hot_news/cache`.
    pub cache_dir: Option<PathBuf>,
    /// Keep the cache in memory only.
    pub memory_cache: bool,
    /// Per-request timeout.
    pub http_timeout_secs: u64,
    /// Default `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Base URL of the Bilibili API (overridable for testing against a mock).
    pub bilibili_api_base: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_ttl_minutes: DEFAULT_CACHE_TTL_MINUTES,
            cache_dir: None,
            memory_cache: false,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            bilibili_api_base: DEFAULT_BILIBILI_API_BASE.to_string(),
        }
    }
}

impl AppConfig {
    /// Parse a YAML document. Missing keys fall back to defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Read and parse a YAML config file.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let raw = tokio::fs::read_to_string(path).await?;
        let config = Self::from_yaml(&raw)?;
        info!("Loaded configuration file");
        Ok(config)
    }

    /// Build the effective config: file (if any), then CLI overrides.
    pub async fn resolve(cli: &Cli) -> Result<Self, Box<dyn Error>> {
        let base = match &cli.config {
            Some(path) => Self::load(path).await?,
            None => Self::default(),
        };
        let config = base.with_overrides(cli);
        config.cache_ttl()?;
        Ok(config)
    }

    /// Apply CLI flags on top of this config.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(ttl) = cli.cache_ttl_minutes {
            self.cache_ttl_minutes = ttl;
        }
        if let Some(dir) = &cli.cache_dir {
            self.cache_dir = Some(dir.clone());
        }
        if cli.memory_cache {
            self.memory_cache = true;
        }
        if let Some(secs) = cli.timeout_secs {
            self.http_timeout_secs = secs;
        }
        self
    }

    /// Cache TTL as a duration. Fails when the minutes don't fit a `TimeDelta`.
    pub fn cache_ttl(&self) -> Result<chrono::Duration, Box<dyn Error>> {
        i64::try_from(self.cache_ttl_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .ok_or_else(|| format!("cache_ttl_minutes out of range: {}", self.cache_ttl_minutes).into())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// The cache directory, defaulting under the system temp dir.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("daily_hot_news").join("cache"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.cache_ttl_minutes, 30);
        assert_eq!(config.cache_ttl().unwrap(), chrono::Duration::minutes(30));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert!(config.cache_dir().ends_with("daily_hot_news/cache"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml("cache_ttl_minutes: 5\nhttp_timeout_secs: 10\n").unwrap();
        assert_eq!(config.cache_ttl_minutes, 5);
        assert_eq!(config.http_timeout_secs, 10);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.bilibili_api_base, DEFAULT_BILIBILI_API_BASE);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = AppConfig::from_yaml("cache_ttl_minutes: 5\ncache_dir: /srv/cache\n").unwrap();
        let cli = Cli::parse_from([
            "daily_hot_news",
            "hupu-trending",
            "--cache-ttl-minutes",
            "90",
            "--timeout-secs",
            "3",
        ]);

        let config = file.with_overrides(&cli);
        assert_eq!(config.cache_ttl_minutes, 90);
        assert_eq!(config.http_timeout_secs, 3);
        assert_eq!(config.cache_dir(), PathBuf::from("/srv/cache"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(&path, "memory_cache: true\nuser_agent: test-agent\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert!(config.memory_cache);
        assert_eq!(config.user_agent, "test-agent");
    }

    #[tokio::test]
    async fn test_resolve_rejects_out_of_range_ttl() {
        for minutes in [i64::MAX.to_string(), u64::MAX.to_string()] {
            let cli = Cli::parse_from(["daily_hot_news", "weibo-trending", "--cache-ttl-minutes", &minutes]);
            let err = AppConfig::resolve(&cli).await.unwrap_err();
            assert!(err.to_string().contains("out of range"));
        }
    }

    #[tokio::test]
    async fn test_resolve_accepts_large_valid_ttl() {
        let cli = Cli::parse_from(["daily_hot_news", "weibo-trending", "--cache-ttl-minutes", "525600"]);
        let config = AppConfig::resolve(&cli).await.unwrap();
        assert_eq!(config.cache_ttl().unwrap(), chrono::Duration::days(365));
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(AppConfig::from_yaml("cache_ttl_minutes: [not, a, number]").is_err());
    }
}
