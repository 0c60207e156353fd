//! Time-to-live cache for expensive derived material.
//!
//! A [`TtlCache`] stores JSON payloads under string keys. Every entry is
//! stamped with its creation time, and is considered valid while
//! `now - created <= ttl`. The TTL is fixed per cache instance.
//!
//! The cache is best-effort: it never fails its caller.
//! - `get` reports a miss for absent, expired, or undecodable entries, and
//!   deletes the latter two before returning.
//! - `set` and `clear` swallow storage errors after logging them.
//!
//! # Storage
//!
//! Persistence goes through the [`CacheStore`] trait:
//! - [`MemoryStore`]: process-local map.
//! - [`FileStore`]: one `<key>.json` file per entry, replaced atomically
//!   (write to a temp file in the same directory, then rename).
//!
//! # On-disk format
//!
//! ```json
//! { "timestamp": "2025-05-06T08:00:00.000000Z", "data": { ... } }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, rng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::error::FetchError;

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Raw key/value storage behind a [`TtlCache`].
///
/// `name` is always an already-sanitized storage identifier.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns `Ok(None)` when nothing is stored under `name`.
    async fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
    /// Replace whatever is stored under `name`. Readers must never see a partial write.
    async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()>;
    /// Removing a missing entry is not an error.
    async fn remove(&self, name: &str) -> io::Result<()>;
    async fn clear(&self) -> io::Result<()>;
}

/// Process-local storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> io::Error {
        io::Error::other("memory cache lock poisoned")
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(name).cloned())
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, name: &str) -> io::Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(name);
        Ok(())
    }

    async fn clear(&self) -> io::Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.clear();
        Ok(())
    }
}

/// One JSON file per entry inside `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create the store, creating `dir` if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.path_for(name);
        let suffix: u64 = rng().random();
        let tmp = self.dir.join(format!(".{name}.{suffix:016x}.tmp"));

        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, &target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(name)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    async fn clear(&self) -> io::Result<()> {
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let is_entry = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(".json"));
            if is_entry {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

/// Name used for keys with no storable characters at all.
const EMPTY_KEY_NAME: &str = "_";

/// Map an arbitrary key to a storage-safe name (ASCII alphanumerics and `-_.`).
///
/// Distinct keys can collapse to the same name (`"a/b"` and `"ab"`) and then
/// share one entry.
pub fn safe_key(key: &str) -> String {
    let name: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    if name.is_empty() {
        EMPTY_KEY_NAME.to_string()
    } else {
        name
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    timestamp: DateTime<Utc>,
    data: T,
}

/// Best-effort TTL cache over a [`CacheStore`].
///
/// Cloning is cheap; clones share the same storage.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache").field("ttl", &self.ttl).finish()
    }
}

impl TtlCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CacheStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, ttl }
    }

    /// In-memory cache with the system clock.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch a live entry. Expired or undecodable entries are purged and reported as a miss.
    #[instrument(level = "debug", skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let name = safe_key(key);
        let bytes = match self.store.read(&name).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed; treating as miss");
                return None;
            }
        };

        let entry = match decode::<T>(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Purging unreadable cache entry");
                self.purge(&name).await;
                return None;
            }
        };

        let age = self.clock.now() - entry.timestamp;
        if age > self.ttl {
            debug!(key, age_secs = age.num_seconds(), "Cache entry expired");
            self.purge(&name).await;
            return None;
        }

        debug!(key, "Cache hit");
        Some(entry.data)
    }

    /// Store `data` under `key`, stamped with the current time. Never fails.
    #[instrument(level = "debug", skip(self, data))]
    pub async fn set<T: Serialize>(&self, key: &str, data: &T) {
        let entry = CacheEntry {
            timestamp: self.clock.now(),
            data,
        };
        let bytes = match serde_json::to_vec_pretty(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Cache payload not serializable; skipping");
                return;
            }
        };
        if let Err(e) = self.store.write(&safe_key(key), &bytes).await {
            warn!(key, error = %e, "Cache write failed; ignoring");
        }
    }

    /// Drop every entry. Never fails.
    #[instrument(level = "debug", skip(self))]
    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Cache clear failed; ignoring");
        }
    }

    async fn purge(&self, name: &str) {
        if let Err(e) = self.store.remove(name).await {
            warn!(name, error = %e, "Failed to remove cache entry");
        }
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<CacheEntry<T>, FetchError> {
    serde_json::from_slice(bytes).map_err(|e| FetchError::CacheCorruption(e.to_string()))
}
