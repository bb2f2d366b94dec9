//! In-process tier: a bounded map behind a reader/writer lock.
//!
//! The lock never leaves this module; callers only see owned values.

use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::entry::CacheEntry;
use crate::types::now_ms;

pub(crate) enum MemoryLookup<V> {
    Hit(V),
    /// Present but past its expiry; it has been removed
    Expired,
    Absent,
}

/// Outcome of an insert.
#[derive(Debug, Default)]
pub(crate) struct InsertOutcome {
    pub evicted: Option<String>,
}

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    usage_bytes: u64,
}

pub(crate) struct MemoryTier<V> {
    inner: RwLock<Inner<V>>,
    max_entries: Option<usize>,
    max_bytes: Option<u64>,
    access_seq: AtomicU64,
}

impl<V: Clone> MemoryTier<V> {
    pub fn new(max_entries: Option<usize>, max_bytes: Option<u64>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                usage_bytes: 0,
            }),
            max_entries,
            max_bytes,
            access_seq: AtomicU64::new(0),
        }
    }

    #[inline]
    fn next_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up `key`, bumping access bookkeeping on a live hit and dropping
    /// the entry if it has expired.
    pub fn get(&self, key: &str) -> MemoryLookup<V> {
        let now = now_ms();
        let expired = {
            let inner = self.inner.read();
            inner.entries.get(key).map(|e| e.is_expired_at(now))
        };

        match expired {
            None => MemoryLookup::Absent,
            Some(false) => self.touch(key, now),
            Some(true) => {
                let mut inner = self.inner.write();
                // re-check: another writer may have replaced it in between
                match inner.entries.get(key).map(|e| e.is_expired_at(now)) {
                    Some(true) => {
                        Self::remove_locked(&mut inner, key);
                        MemoryLookup::Expired
                    }
                    Some(false) => {
                        drop(inner);
                        self.touch(key, now)
                    }
                    None => MemoryLookup::Absent,
                }
            }
        }
    }

    fn touch(&self, key: &str, now: u64) -> MemoryLookup<V> {
        let mut inner = self.inner.write();
        let expired = inner.entries.get(key).map(|e| e.is_expired_at(now));
        match expired {
            Some(false) => match inner.entries.get_mut(key) {
                Some(entry) => {
                    // under the write lock: sequence order is lock order
                    entry.mark_accessed(self.next_seq());
                    MemoryLookup::Hit(entry.value.clone())
                }
                None => MemoryLookup::Absent,
            },
            Some(true) => {
                Self::remove_locked(&mut inner, key);
                MemoryLookup::Expired
            }
            None => MemoryLookup::Absent,
        }
    }

    /// Insert or replace. When a new key would push the map past a bound,
    /// the single least-recently-accessed entry is evicted first.
    pub fn insert(&self, key: String, mut entry: CacheEntry<V>) -> InsertOutcome {
        let mut inner = self.inner.write();
        entry.access_seq = self.next_seq();
        entry.last_accessed = now_ms();
        let mut outcome = InsertOutcome::default();

        let replaced = Self::remove_locked(&mut inner, &key);
        if replaced.is_none() && self.exceeds_bound(&inner, entry.size_bytes) {
            if let Some(victim) = Self::least_recently_accessed(&inner) {
                Self::remove_locked(&mut inner, &victim);
                debug!("Evicted LRU cache entry {}", victim);
                outcome.evicted = Some(victim);
            }
        }

        inner.usage_bytes += entry.size_bytes;
        inner.entries.insert(key, entry);
        outcome
    }

    fn exceeds_bound(&self, inner: &Inner<V>, incoming_bytes: u64) -> bool {
        let over_count = self
            .max_entries
            .map(|max| inner.entries.len() + 1 > max)
            .unwrap_or(false);
        let over_bytes = self
            .max_bytes
            .map(|max| inner.usage_bytes + incoming_bytes > max)
            .unwrap_or(false);
        over_count || over_bytes
    }

    /// Linear scan; fine for the hundreds-to-thousands of entries these
    /// caches hold.
    fn least_recently_accessed(inner: &Inner<V>) -> Option<String> {
        inner
            .entries
            .iter()
            .min_by_key(|(_, e)| e.access_seq)
            .map(|(k, _)| k.clone())
    }

    fn remove_locked(inner: &mut Inner<V>, key: &str) -> Option<CacheEntry<V>> {
        let removed = inner.entries.remove(key);
        if let Some(ref entry) = removed {
            inner.usage_bytes = inner.usage_bytes.saturating_sub(entry.size_bytes);
        }
        removed
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        Self::remove_locked(&mut inner, key).is_some()
    }

    /// Remove every entry matching `predicate`, returning the removed keys.
    pub fn remove_where<F>(&self, mut predicate: F) -> Vec<String>
    where
        F: FnMut(&str, &CacheEntry<V>) -> bool,
    {
        let mut inner = self.inner.write();
        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(k, e)| predicate(k, e))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            Self::remove_locked(&mut inner, key);
        }
        doomed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.usage_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn usage_bytes(&self) -> u64 {
        self.inner.read().usage_bytes
    }

    pub fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = now_ms();
        self.inner
            .read()
            .entries
            .get(key)
            .filter(|e| !e.is_expired_at(now))
            .cloned()
    }

    /// Copy of the live (unexpired) entries.
    pub fn snapshot(&self) -> Vec<(String, CacheEntry<V>)> {
        let now = now_ms();
        self.inner
            .read()
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired_at(now))
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect()
    }
}
