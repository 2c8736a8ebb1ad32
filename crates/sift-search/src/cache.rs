//! Namespaced TTL cache with LRU eviction.
//!
//! Memoizes query embeddings, document-store reads and whole search results
//! so repeated queries do not hit the upstream providers again.
//!
//! # Locking
//!
//! Every namespace is its own shard: a `parking_lot::Mutex` around a
//! `HashMap`. A key lives in exactly one shard, so `get`/`set`/`invalidate`
//! on one key are linearizable. The shard table itself sits behind an
//! `RwLock` that is only write-locked to create a new namespace. Inserts of
//! new keys additionally take `admission` so the size bound holds exactly;
//! reads never take it. No code path holds two shard locks at once, and the
//! sweeper locks one shard at a time, so a reader waits at most for one
//! shard's sweep step. The live-entry counter only changes while the shard
//! that holds the entry is locked.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sift_core::{SiftError, SiftResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Well-known cache namespaces.
pub mod namespaces {
    /// Query embeddings.
    pub const EMBEDDINGS: &str = "embeddings";
    /// Document-store reads (candidate lists, document embeddings).
    pub const VECTOR_DB: &str = "vector_db";
    /// Whole search results.
    pub const SEARCH_RESULTS: &str = "search_results";
    /// Anything else.
    pub const GENERIC: &str = "generic";
}

/// Default TTLs per namespace, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheTtls {
    #[serde(default = "default_embeddings_ttl")]
    pub embeddings: u64,
    #[serde(default = "default_vector_db_ttl")]
    pub vector_db: u64,
    #[serde(default = "default_search_results_ttl")]
    pub search_results: u64,
    /// Used for `generic` and any namespace not listed above.
    #[serde(default = "default_generic_ttl")]
    pub default: u64,
}

fn default_embeddings_ttl() -> u64 {
    24 * 60 * 60
}
fn default_vector_db_ttl() -> u64 {
    60 * 60
}
fn default_search_results_ttl() -> u64 {
    30 * 60
}
fn default_generic_ttl() -> u64 {
    60 * 60
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            embeddings: default_embeddings_ttl(),
            vector_db: default_vector_db_ttl(),
            search_results: default_search_results_ttl(),
            default: default_generic_ttl(),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When `false`, every lookup misses and nothing is stored.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of live entries across all namespaces.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Interval of the background expiry sweep, in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default)]
    pub ttl: CacheTtls,
}

fn default_true() -> bool {
    true
}
fn default_max_size() -> usize {
    1000
}
fn default_cleanup_interval() -> u64 {
    600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: default_max_size(),
            cleanup_interval_secs: default_cleanup_interval(),
            ttl: CacheTtls::default(),
        }
    }
}

impl CacheConfig {
    /// Default TTL for entries in `namespace`.
    pub fn ttl_for(&self, namespace: &str) -> Duration {
        let secs = match namespace {
            namespaces::EMBEDDINGS => self.ttl.embeddings,
            namespaces::VECTOR_DB => self.ttl.vector_db,
            namespaces::SEARCH_RESULTS => self.ttl.search_results,
            _ => self.ttl.default,
        };
        Duration::from_secs(secs)
    }

    /// Sweep interval as a [`Duration`].
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// SHA-256 hex digest of the given key parts, separated by a unit separator.
pub fn hash_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

struct CacheEntry {
    value: serde_json::Value,
    created_at: Instant,
    created_wall: DateTime<Utc>,
    ttl: Duration,
    hits: u64,
    last_access: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

type Shard = Arc<Mutex<HashMap<String, CacheEntry>>>;

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed for expiry or capacity.
    pub evictions: u64,
    /// The capacity-driven subset of `evictions`.
    pub lru_evictions: u64,
    pub total_requests: u64,
    /// Live entries right now.
    pub size: usize,
    /// Hits as a percentage of lookups, rounded to two decimals.
    pub hit_rate: f64,
}

/// Description of one cached entry for introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryInfo {
    pub namespace: String,
    pub key: String,
    pub hits: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl_remaining_secs: u64,
    pub is_expired: bool,
}

/// Outcome of [`Cache::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub cleared_count: usize,
    pub remaining_count: usize,
}

/// Namespaced TTL key-value cache shared by all concurrent searches.
pub struct Cache {
    config: CacheConfig,
    shards: RwLock<HashMap<String, Shard>>,
    admission: Mutex<()>,
    size: AtomicUsize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    lru_evictions: AtomicU64,
    total_requests: AtomicU64,
}

impl Cache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        info!(
            max_size = config.max_size,
            enabled = config.enabled,
            "Cache initialized"
        );
        Self {
            config,
            shards: RwLock::new(HashMap::new()),
            admission: Mutex::new(()),
            size: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            lru_evictions: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
        }
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Default TTL for `namespace`.
    pub fn ttl_for(&self, namespace: &str) -> Duration {
        self.config.ttl_for(namespace)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn shard(&self, namespace: &str) -> Option<Shard> {
        self.shards.read().get(namespace).cloned()
    }

    fn shard_or_create(&self, namespace: &str) -> Shard {
        if let Some(shard) = self.shard(namespace) {
            return shard;
        }
        let mut shards = self.shards.write();
        Arc::clone(shards.entry(namespace.to_string()).or_default())
    }

    fn all_shards(&self) -> Vec<(String, Shard)> {
        self.shards
            .read()
            .iter()
            .map(|(ns, shard)| (ns.clone(), Arc::clone(shard)))
            .collect()
    }

    /// Look up a raw value. Expired entries are removed and reported as a miss.
    pub fn get(&self, namespace: &str, key: &str) -> Option<serde_json::Value> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if !self.config.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let Some(shard) = self.shard(namespace) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(namespace, key, "Cache miss");
            return None;
        };

        let mut entries = shard.lock();
        let now = Instant::now();
        let expired = match entries.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(namespace, key, "Cache miss");
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            entries.remove(key);
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(namespace, key, "Cache entry expired");
            return None;
        }

        let tick = self.tick();
        let entry = entries.get_mut(key)?;
        entry.hits += 1;
        entry.last_access = tick;
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(namespace, key, hits = entry.hits, "Cache hit");
        Some(entry.value.clone())
    }

    /// Look up and decode a typed value.
    ///
    /// A value that no longer decodes is dropped and counted as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let value = self.get(namespace, key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(namespace, key, error = %e, "Undecodable cache entry, treating as miss");
                self.hits.fetch_sub(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.invalidate(namespace, key);
                None
            }
        }
    }

    /// Store a raw value with an explicit TTL.
    ///
    /// Inserting a new key into a full cache first evicts the least recently
    /// used entry.
    pub fn set(&self, namespace: &str, key: &str, value: serde_json::Value, ttl: Duration) {
        if !self.config.enabled || self.config.max_size == 0 {
            return;
        }

        let shard = self.shard_or_create(namespace);
        let _admission = self.admission.lock();

        let exists = shard.lock().contains_key(key);
        if !exists {
            while self.size.load(Ordering::Relaxed) >= self.config.max_size {
                if !self.evict_lru() {
                    break;
                }
            }
        }

        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
            created_wall: Utc::now(),
            ttl,
            hits: 0,
            last_access: self.tick(),
        };
        let mut entries = shard.lock();
        if entries.insert(key.to_string(), entry).is_none() {
            self.size.fetch_add(1, Ordering::Relaxed);
        }
        drop(entries);
        debug!(namespace, key, ttl_secs = ttl.as_secs(), "Cache set");
    }

    /// Serialize and store a typed value with an explicit TTL.
    pub fn set_as<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> SiftResult<()> {
        let value = serde_json::to_value(value).map_err(|e| SiftError::Cache(e.to_string()))?;
        self.set(namespace, key, value, ttl);
        Ok(())
    }

    /// Remove one entry. Returns `true` if it was present.
    pub fn invalidate(&self, namespace: &str, key: &str) -> bool {
        let Some(shard) = self.shard(namespace) else {
            return false;
        };
        let mut entries = shard.lock();
        let removed = entries.remove(key).is_some();
        if removed {
            self.size.fetch_sub(1, Ordering::Relaxed);
        }
        drop(entries);
        if removed {
            debug!(namespace, key, "Cache entry invalidated");
        }
        removed
    }

    /// Remove every entry of `namespace`, or of all namespaces for `None`.
    pub fn clear(&self, namespace: Option<&str>) -> ClearReport {
        let shards: Vec<Shard> = match namespace {
            Some(ns) => self.shard(ns).into_iter().collect(),
            None => self.all_shards().into_iter().map(|(_, s)| s).collect(),
        };

        let mut cleared = 0;
        for shard in shards {
            let mut entries = shard.lock();
            let count = entries.len();
            entries.clear();
            self.size.fetch_sub(count, Ordering::Relaxed);
            cleared += count;
        }

        let remaining = self.size.load(Ordering::Relaxed);
        info!(
            namespace = namespace.unwrap_or("*"),
            cleared, remaining, "Cache cleared"
        );
        ClearReport {
            cleared_count: cleared,
            remaining_count: remaining,
        }
    }

    /// Remove the least recently used entry. Returns `false` when empty.
    fn evict_lru(&self) -> bool {
        loop {
            let mut victim: Option<(String, String, u64)> = None;
            for (ns, shard) in self.all_shards() {
                let entries = shard.lock();
                for (key, entry) in entries.iter() {
                    if victim.as_ref().map_or(true, |(_, _, t)| entry.last_access < *t) {
                        victim = Some((ns.clone(), key.clone(), entry.last_access));
                    }
                }
            }

            let Some((ns, key, last_access)) = victim else {
                return false;
            };
            let Some(shard) = self.shard(&ns) else {
                continue;
            };
            let mut entries = shard.lock();
            // A concurrent read may have touched the entry since the scan.
            if entries.get(&key).map(|e| e.last_access) != Some(last_access) {
                continue;
            }
            entries.remove(&key);
            self.size.fetch_sub(1, Ordering::Relaxed);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.lru_evictions.fetch_add(1, Ordering::Relaxed);
            info!(namespace = %ns, key = %key, "LRU eviction");
            return true;
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut removed = 0;
        for (_, shard) in self.all_shards() {
            let mut entries = shard.lock();
            let now = Instant::now();
            let before = entries.len();
            entries.retain(|_, e| !e.is_expired(now));
            let swept = before - entries.len();
            self.size.fetch_sub(swept, Ordering::Relaxed);
            removed += swept;
        }
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            info!(removed, "Swept expired cache entries");
        }
        removed
    }

    /// Start the periodic expiry sweep.
    ///
    /// The task holds only a weak reference and exits once the cache is dropped.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // The first tick completes immediately.
            timer.tick().await;
            loop {
                timer.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.sweep_expired();
            }
        })
    }

    /// Current counters.
    pub fn metrics(&self) -> CacheMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = self.total_requests.load(Ordering::Relaxed);
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        CacheMetrics {
            hits,
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            lru_evictions: self.lru_evictions.load(Ordering::Relaxed),
            total_requests: total,
            size: self.size.load(Ordering::Relaxed),
            hit_rate,
        }
    }

    /// Describe live entries of `namespace` (or all), most-hit first.
    pub fn entries(&self, namespace: Option<&str>) -> Vec<CacheEntryInfo> {
        let now = Instant::now();
        let mut info: Vec<CacheEntryInfo> = Vec::new();
        for (ns, shard) in self.all_shards() {
            if namespace.is_some_and(|wanted| wanted != ns) {
                continue;
            }
            let entries = shard.lock();
            for (key, entry) in entries.iter() {
                let ttl = chrono::Duration::from_std(entry.ttl).unwrap_or(chrono::Duration::MAX);
                let elapsed = now.saturating_duration_since(entry.created_at);
                info.push(CacheEntryInfo {
                    namespace: ns.clone(),
                    key: key.clone(),
                    hits: entry.hits,
                    created_at: entry.created_wall,
                    expires_at: entry
                        .created_wall
                        .checked_add_signed(ttl)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                    ttl_remaining_secs: entry.ttl.saturating_sub(elapsed).as_secs(),
                    is_expired: entry.is_expired(now),
                });
            }
        }
        info.sort_by(|a, b| b.hits.cmp(&a.hits));
        info
    }

    /// Number of live (possibly expired, not yet swept) entries.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// `true` when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
