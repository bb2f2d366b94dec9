//! Cache entry and statistics types shared by every cache tier.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::types::now_ms;

/// A value cached with metadata for TTL and LRU tracking.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,

    /// When this entry was stored (Unix timestamp ms)
    pub created_at: u64,

    /// Entry is dead from this instant on (Unix timestamp ms)
    pub expires_at: u64,

    /// Number of reads, starting at 1 for the write itself
    pub access_count: u64,

    /// Last read or write (Unix timestamp ms)
    pub last_accessed: u64,

    /// Serialized size, used against the memory bound
    pub size_bytes: u64,

    /// Tool name or resource type the entry is counted under
    pub category: Option<String>,

    /// Access sequence, assigned under the tier's write lock; LRU order
    pub(crate) access_seq: u64,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Duration, size_bytes: u64) -> Self {
        let now = now_ms();
        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
            access_count: 1,
            last_accessed: now,
            size_bytes,
            category: None,
            access_seq: 0,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    #[inline]
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    /// Record one read.
    #[inline]
    pub fn mark_accessed(&mut self, seq: u64) {
        self.access_count += 1;
        self.last_accessed = now_ms();
        self.access_seq = seq;
    }

    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    pub fn idle_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_accessed)
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_ttl(&self, now: u64) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now))
    }
}

/// Hit/miss counters for one tool or resource type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

/// Statistics about cache usage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Hits served by the distributed tier (included in `hits`)
    pub distributed_hits: u64,
    /// Distributed-tier operations that failed or timed out
    pub distributed_errors: u64,
    pub evictions: u64,
    /// Entries currently held in memory
    pub entries: usize,
    /// Sum of entry sizes currently held in memory
    pub memory_usage: u64,
    pub categories: HashMap<String, CategoryStats>,
}

impl CacheStats {
    /// hits / (hits + misses), or 0.0 before any request.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Which tier answered a lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheTier {
    /// In-process bounded map
    Memory,
    /// Store shared between processes
    Distributed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry() {
        let entry = CacheEntry::new("v", Duration::from_millis(500), 1);
        assert!(!entry.is_expired_at(entry.created_at));
        assert!(entry.is_expired_at(entry.created_at + 500));
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.remaining_ttl(entry.expires_at + 10), Duration::ZERO);
    }

    #[test]
    fn test_hit_ratio_empty_is_zero() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_ratio(), 0.0);

        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }
}
