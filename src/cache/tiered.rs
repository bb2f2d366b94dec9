//! Two-tier cache: bounded in-process map in front of an optional
//! distributed store.
//!
//! # Lookup chain
//! memory → distributed, with promotion into memory on a distributed hit.
//!
//! # Consistency
//! The distributed tier is best-effort. Writes to it are logged and dropped on
//! failure, and invalidation does not wait for it to agree. A cache operation
//! never fails its caller.

use log::{debug, warn};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::codec;
use super::entry::{CacheEntry, CacheStats, CacheTier, CategoryStats};
use super::memory::{MemoryLookup, MemoryTier};
use super::store::{DistributedStore, StoreError};
use crate::types::now_ms;

// ================================================================================================
// SETTINGS
// ================================================================================================

/// Per-instance settings. Built from the component configs in
/// [`crate::config`].
#[derive(Clone, Debug)]
pub struct TierSettings {
    /// Prefix for keys in the distributed tier, e.g. `acmg:cache:tool:`
    pub namespace: String,
    /// A disabled cache always misses and drops writes
    pub enabled: bool,
    pub default_ttl: Duration,
    pub max_entries: Option<usize>,
    pub max_memory_bytes: Option<u64>,
    /// Distributed payloads above this many bytes are compressed
    pub compression_threshold: usize,
    /// Upper bound on one distributed round trip
    pub store_timeout: Duration,
}

impl TierSettings {
    pub fn new(namespace: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            enabled: true,
            default_ttl,
            max_entries: None,
            max_memory_bytes: None,
            compression_threshold: 1024,
            store_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_max_memory_bytes(mut self, max_bytes: u64) -> Self {
        self.max_memory_bytes = Some(max_bytes);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Which tier answered a lookup, carrying the value on a hit.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<V> {
    Memory(V),
    Distributed(V),
    Miss,
}

impl<V> Lookup<V> {
    pub fn tier(&self) -> Option<CacheTier> {
        match self {
            Lookup::Memory(_) => Some(CacheTier::Memory),
            Lookup::Distributed(_) => Some(CacheTier::Distributed),
            Lookup::Miss => None,
        }
    }

    pub fn into_option(self) -> Option<V> {
        match self {
            Lookup::Memory(v) | Lookup::Distributed(v) => Some(v),
            Lookup::Miss => None,
        }
    }
}

// ================================================================================================
// TIERED CACHE
// ================================================================================================

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    distributed_hits: AtomicU64,
    distributed_errors: AtomicU64,
    evictions: AtomicU64,
}

/// Generic two-tier cache. One instance owns its memory tier exclusively.
pub struct TieredCache<V> {
    settings: TierSettings,
    memory: MemoryTier<V>,
    distributed: Option<Arc<dyn DistributedStore>>,
    counters: Counters,
    categories: RwLock<HashMap<String, CategoryStats>>,
}

impl<V> std::fmt::Debug for TieredCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("settings", &self.settings)
            .field("distributed", &self.distributed.is_some())
            .finish()
    }
}

impl<V> TieredCache<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    pub fn new(settings: TierSettings, distributed: Option<Arc<dyn DistributedStore>>) -> Self {
        Self {
            memory: MemoryTier::new(settings.max_entries, settings.max_memory_bytes),
            settings,
            distributed,
            counters: Counters::default(),
            categories: RwLock::new(HashMap::new()),
        }
    }

    pub fn in_memory(settings: TierSettings) -> Self {
        Self::new(settings, None)
    }

    pub fn settings(&self) -> &TierSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn has_distributed(&self) -> bool {
        self.distributed.is_some()
    }

    fn distributed_key(&self, key: &str) -> String {
        format!("{}{}", self.settings.namespace, key)
    }

    // ============================================================================================
    // READS
    // ============================================================================================

    pub async fn get(&self, key: &str) -> Option<V> {
        self.lookup(key, None).await.into_option()
    }

    /// Lookup that reports which tier answered.
    pub async fn get_traced(&self, key: &str) -> Lookup<V> {
        self.lookup(key, None).await
    }

    /// Lookup that also counts the hit or miss under `category`.
    pub async fn get_categorized(&self, key: &str, category: &str) -> Option<V> {
        self.lookup(key, Some(category)).await.into_option()
    }

    async fn lookup(&self, key: &str, category: Option<&str>) -> Lookup<V> {
        if !self.settings.enabled {
            return Lookup::Miss;
        }

        if let MemoryLookup::Hit(value) = self.memory.get(key) {
            self.record_hit(category);
            return Lookup::Memory(value);
        }

        if let Some((value, ttl)) = self.fetch_distributed(key).await {
            self.insert_memory(key.to_string(), value.clone(), ttl, category.map(str::to_string));
            self.counters.distributed_hits.fetch_add(1, Ordering::Relaxed);
            self.record_hit(category);
            return Lookup::Distributed(value);
        }

        self.record_miss(category);
        Lookup::Miss
    }

    /// Read `key` from the distributed tier. The returned TTL is what the
    /// writer left on the row, capped at this cache's default, so a promoted
    /// copy never outlives the original.
    async fn fetch_distributed(&self, key: &str) -> Option<(V, Duration)> {
        let store = self.distributed.as_ref()?;
        let dkey = self.distributed_key(key);
        let stored = match self.bounded("get", store.get(&dkey)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                self.distributed_failed("get", &dkey, &e);
                return None;
            }
        };

        let ttl = stored.remaining_ttl(now_ms()).min(self.settings.default_ttl);
        if ttl.is_zero() {
            return None;
        }
        match codec::decode::<V>(&stored.bytes) {
            Ok(value) => Some((value, ttl)),
            Err(e) => {
                self.distributed_failed("decode", &dkey, &e);
                None
            }
        }
    }

    // ============================================================================================
    // WRITES
    // ============================================================================================

    /// Store in both tiers. `None` uses the default TTL.
    pub async fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        self.write(key, value, ttl, ttl, None).await;
    }

    /// Store in both tiers, counting the write under `category`.
    pub async fn set_categorized(&self, key: &str, value: V, ttl: Option<Duration>, category: &str) {
        let ttl = ttl.unwrap_or(self.settings.default_ttl);
        self.write(key, value, ttl, ttl, Some(category)).await;
    }

    /// Store with separate lifetimes for the two tiers.
    pub async fn set_with_tiers(
        &self,
        key: &str,
        value: V,
        memory_ttl: Duration,
        distributed_ttl: Duration,
    ) {
        self.write(key, value, memory_ttl, distributed_ttl, None).await;
    }

    async fn write(
        &self,
        key: &str,
        value: V,
        memory_ttl: Duration,
        distributed_ttl: Duration,
        category: Option<&str>,
    ) {
        if !self.settings.enabled {
            return;
        }

        if let Some(category) = category {
            self.categories
                .write()
                .entry(category.to_string())
                .or_default()
                .sets += 1;
        }

        let payload = match &self.distributed {
            Some(_) => Some(codec::encode(&value, self.settings.compression_threshold)),
            None => None,
        };

        self.insert_memory(
            key.to_string(),
            value,
            memory_ttl,
            category.map(str::to_string),
        );

        if let (Some(store), Some(payload)) = (&self.distributed, payload) {
            let dkey = self.distributed_key(key);
            let result = match payload {
                Ok(bytes) => self.bounded("set", store.set(&dkey, bytes, distributed_ttl)).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                self.distributed_failed("set", &dkey, &e);
            }
        }
    }

    fn insert_memory(&self, key: String, value: V, ttl: Duration, category: Option<String>) {
        let size = serde_json::to_vec(&value)
            .map(|b| b.len() as u64)
            .unwrap_or(0);
        let entry = CacheEntry::new(value, ttl, size).with_category(category);
        let outcome = self.memory.insert(key, entry);
        if outcome.evicted.is_some() {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ============================================================================================
    // INVALIDATION
    // ============================================================================================

    /// Drop `key` from memory and, best-effort, from the distributed tier.
    /// Returns whether a memory entry was removed.
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = self.memory.remove(key);
        self.delete_distributed(key).await;
        removed
    }

    /// Exact-match only: `pattern` is compared to whole keys, not expanded as
    /// a wildcard.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        let removed = self.memory.remove_where(|key, _| key == pattern);
        self.delete_distributed(pattern).await;
        removed.len()
    }

    /// Drop every memory entry matching `predicate`, then best-effort delete
    /// the same keys from the distributed tier.
    pub async fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&str, &CacheEntry<V>) -> bool,
    {
        let removed = self.memory.remove_where(predicate);
        for key in &removed {
            self.delete_distributed(key).await;
        }
        removed.len()
    }

    /// Remove memory entries matching `predicate` without touching the
    /// distributed tier. Used by periodic sweeps.
    pub fn purge_memory_where<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&str, &CacheEntry<V>) -> bool,
    {
        self.memory.remove_where(predicate).len()
    }

    async fn delete_distributed(&self, key: &str) {
        if let Some(store) = &self.distributed {
            let dkey = self.distributed_key(key);
            if let Err(e) = self.bounded("delete", store.delete(&dkey)).await {
                self.distributed_failed("delete", &dkey, &e);
            }
        }
    }

    /// Empty both tiers for this namespace and reset statistics.
    pub async fn clear(&self) {
        self.memory.clear();
        if let Some(store) = &self.distributed {
            let namespace = self.settings.namespace.clone();
            if let Err(e) = self.bounded("clear", store.delete_prefix(&namespace)).await {
                self.distributed_failed("clear", &namespace, &e);
            }
        }
        self.counters.hits.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
        self.counters.distributed_hits.store(0, Ordering::Relaxed);
        self.counters.distributed_errors.store(0, Ordering::Relaxed);
        self.counters.evictions.store(0, Ordering::Relaxed);
        self.categories.write().clear();
    }

    // ============================================================================================
    // INTROSPECTION
    // ============================================================================================

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            distributed_hits: self.counters.distributed_hits.load(Ordering::Relaxed),
            distributed_errors: self.counters.distributed_errors.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.memory.len(),
            memory_usage: self.memory.usage_bytes(),
            categories: self.categories.read().clone(),
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        self.stats().hit_ratio()
    }

    /// Memory entry for `key` without touching access bookkeeping or stats.
    pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        self.memory.peek(key)
    }

    /// Count a hit under `category` only; the overall counters are untouched.
    pub fn record_category_hit(&self, category: &str) {
        self.categories
            .write()
            .entry(category.to_string())
            .or_default()
            .hits += 1;
    }

    /// Live memory entries with their metadata.
    pub fn entries(&self) -> Vec<(String, CacheEntry<V>)> {
        self.memory.snapshot()
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A disabled cache is healthy. Otherwise the distributed tier, when
    /// configured, must answer a ping within the store timeout.
    pub async fn is_healthy(&self) -> bool {
        if !self.settings.enabled {
            return true;
        }
        match &self.distributed {
            None => true,
            Some(store) => match self.bounded("ping", store.ping()).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        "Distributed cache tier unhealthy for {}: {}",
                        self.settings.namespace, e
                    );
                    false
                }
            },
        }
    }

    // ============================================================================================
    // HELPERS
    // ============================================================================================

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.settings.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Distributed {} exceeded {:?}", op, self.settings.store_timeout);
                Err(StoreError::Timeout(self.settings.store_timeout))
            }
        }
    }

    fn distributed_failed(&self, op: &str, key: &str, err: &StoreError) {
        self.counters.distributed_errors.fetch_add(1, Ordering::Relaxed);
        warn!("Distributed cache {} failed for {}: {}", op, key, err);
    }

    fn record_hit(&self, category: Option<&str>) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        if let Some(category) = category {
            self.categories
                .write()
                .entry(category.to_string())
                .or_default()
                .hits += 1;
        }
    }

    fn record_miss(&self, category: Option<&str>) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        if let Some(category) = category {
            self.categories
                .write()
                .entry(category.to_string())
                .or_default()
                .misses += 1;
        }
    }
}
